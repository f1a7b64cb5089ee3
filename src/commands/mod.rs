pub type CmdResult<T> = modelshift::Result<(T, i32)>;

pub(crate) struct GlobalArgs {}

pub mod migrate;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (modelshift::Result<serde_json::Value>, i32) {
    crate::tty::status("modelshift is working...");

    match command {
        crate::Commands::Migrate(args) => dispatch!(args, global, migrate),
    }
}

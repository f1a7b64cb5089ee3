//! Minimal element tree for metadata XML files.
//!
//! Metadata files are small documents whose leaves carry single text values
//! (`<referenceTo>Account</referenceTo>`). The tree keeps element order,
//! attributes and text, which is all the migrations need to read a value,
//! change it and write the document back out.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: &str) -> Self {
        Element {
            name: name.to_string(),
            ..Element::default()
        }
    }

    pub fn with_text(name: &str, text: &str) -> Self {
        Element {
            name: name.to_string(),
            text: Some(text.to_string()),
            ..Element::default()
        }
    }

    /// Text of the first child called `name`.
    pub fn first_value(&self, name: &str) -> Option<&str> {
        self.children
            .iter()
            .find(|c| c.name == name)
            .and_then(|c| c.text.as_deref())
    }

    /// Set the text of the first child called `name`, appending the child if absent.
    pub fn set_first_value(&mut self, name: &str, value: &str) {
        match self.children.iter_mut().find(|c| c.name == name) {
            Some(child) => child.text = Some(value.to_string()),
            None => self.children.push(Element::with_text(name, value)),
        }
    }

    /// Walk `path` down the tree, yielding every element reached.
    pub fn descendants_at<'a>(&'a self, path: &[&str]) -> Vec<&'a Element> {
        let mut current = vec![self];
        for &segment in path {
            current = current
                .into_iter()
                .flat_map(move |e| e.children.iter().filter(move |c| c.name == segment))
                .collect();
        }
        current
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub version: String,
    pub encoding: Option<String>,
    pub standalone: Option<String>,
}

impl Default for Declaration {
    fn default() -> Self {
        Declaration {
            version: "1.0".to_string(),
            encoding: Some("UTF-8".to_string()),
            standalone: Some("yes".to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub declaration: Option<Declaration>,
    pub roots: Vec<Element>,
}

impl Document {
    pub fn root(&self) -> Option<&Element> {
        self.roots.first()
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn xml_error(err: impl std::fmt::Display, context: &str) -> Error {
    Error::internal_xml(err.to_string(), Some(context.to_string()))
}

fn element_from(tag: &BytesStart<'_>) -> Result<Element> {
    let mut element = Element::new(&lossy(tag.name().as_ref()));
    for attr in tag.attributes() {
        let attr = attr.map_err(|e| xml_error(e, "read attribute"))?;
        let value = attr
            .unescape_value()
            .map_err(|e| xml_error(e, "unescape attribute"))?;
        element
            .attributes
            .push((lossy(attr.key.as_ref()), value.into_owned()));
    }
    Ok(element)
}

fn declaration_from(decl: &BytesDecl<'_>) -> Result<Declaration> {
    let version = decl.version().map_err(|e| xml_error(e, "read declaration"))?;
    let encoding = match decl.encoding() {
        Some(value) => Some(lossy(&value.map_err(|e| xml_error(e, "read encoding"))?)),
        None => None,
    };
    let standalone = match decl.standalone() {
        Some(value) => Some(lossy(&value.map_err(|e| xml_error(e, "read standalone"))?)),
        None => None,
    };
    Ok(Declaration {
        version: lossy(&version),
        encoding,
        standalone,
    })
}

fn attach(stack: &mut [Element], roots: &mut Vec<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => roots.push(element),
    }
}

fn append_text(stack: &mut [Element], text: &str) {
    if let Some(current) = stack.last_mut() {
        current.text.get_or_insert_with(String::new).push_str(text);
    }
}

/// Parse an XML document into an element tree.
pub fn parse(xml: &str) -> Result<Document> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut document = Document::default();
    let mut stack: Vec<Element> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Decl(decl)) => document.declaration = Some(declaration_from(&decl)?),
            Ok(Event::Start(tag)) => stack.push(element_from(&tag)?),
            Ok(Event::Empty(tag)) => {
                let element = element_from(&tag)?;
                attach(&mut stack, &mut document.roots, element);
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| xml_error("unexpected closing tag", "parse"))?;
                attach(&mut stack, &mut document.roots, element);
            }
            Ok(Event::Text(text)) => {
                let value = text.unescape().map_err(|e| xml_error(e, "unescape text"))?;
                append_text(&mut stack, &value);
            }
            Ok(Event::CData(data)) => append_text(&mut stack, &lossy(&data.into_inner())),
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(xml_error(
                    e,
                    &format!("parse at byte {}", reader.buffer_position()),
                ))
            }
        }
    }

    if let Some(open) = stack.last() {
        return Err(xml_error(
            format!("element <{}> is never closed", open.name),
            "parse",
        ));
    }
    if document.roots.is_empty() {
        return Err(xml_error("document has no root element", "parse"));
    }

    Ok(document)
}

fn write_element<W: std::io::Write>(writer: &mut Writer<W>, element: &Element) -> Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.children.is_empty() && element.text.is_none() {
        return writer
            .write_event(Event::Empty(start))
            .map_err(|e| xml_error(e, "write element"));
    }

    writer
        .write_event(Event::Start(start))
        .map_err(|e| xml_error(e, "write element"))?;
    if let Some(text) = &element.text {
        writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(|e| xml_error(e, "write text"))?;
    }
    for child in &element.children {
        write_element(writer, child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(|e| xml_error(e, "write element"))
}

/// Serialize a document with four-space indentation.
pub fn to_string(document: &Document) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 4);

    let declaration = document.declaration.clone().unwrap_or_default();
    writer
        .write_event(Event::Decl(BytesDecl::new(
            &declaration.version,
            declaration.encoding.as_deref(),
            declaration.standalone.as_deref(),
        )))
        .map_err(|e| xml_error(e, "write declaration"))?;

    for root in &document.roots {
        write_element(&mut writer, root)?;
    }

    let mut out = String::from_utf8(writer.into_inner()).map_err(|e| xml_error(e, "encode"))?;
    out.push('\n');
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<CustomField xmlns="http://soap.sforce.com/2006/04/metadata">
    <fullName>Legacy__c</fullName>
    <label>Old &amp; Busted</label>
    <referenceTo>Legacy__c</referenceTo>
    <relationshipName>Old_Rel</relationshipName>
    <type>Lookup</type>
</CustomField>
"#;

    #[test]
    fn parses_root_attributes_and_values() {
        let doc = parse(FIELD).unwrap();
        let root = doc.root().unwrap();
        assert_eq!(root.name, "CustomField");
        assert_eq!(
            root.attributes,
            vec![(
                "xmlns".to_string(),
                "http://soap.sforce.com/2006/04/metadata".to_string()
            )]
        );
        assert_eq!(root.first_value("label"), Some("Old & Busted"));
        assert_eq!(root.first_value("referenceTo"), Some("Legacy__c"));
        assert_eq!(root.first_value("missing"), None);
        assert_eq!(doc.declaration.as_ref().unwrap().encoding.as_deref(), Some("UTF-8"));
    }

    #[test]
    fn serializes_back_to_equivalent_document() {
        let doc = parse(FIELD).unwrap();
        let written = to_string(&doc).unwrap();
        assert!(written.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(written.contains("<label>Old &amp; Busted</label>"));
        assert!(written.contains("\n    <type>Lookup</type>\n"));
        assert_eq!(parse(&written).unwrap(), doc);
    }

    #[test]
    fn set_first_value_updates_or_appends() {
        let mut doc = parse(FIELD).unwrap();
        let root = &mut doc.roots[0];
        root.set_first_value("label", "New");
        root.set_first_value("description", "added");
        assert_eq!(root.first_value("label"), Some("New"));
        assert_eq!(root.children.last().unwrap().name, "description");
    }

    #[test]
    fn descendants_follow_nested_paths() {
        let layout = r#"<Layout>
            <layoutSections>
                <layoutColumns>
                    <layoutItems><field>Name</field></layoutItems>
                    <layoutItems><field>Legacy__c</field></layoutItems>
                </layoutColumns>
            </layoutSections>
        </Layout>"#;
        let doc = parse(layout).unwrap();
        let fields: Vec<&str> = doc
            .root()
            .unwrap()
            .descendants_at(&["layoutSections", "layoutColumns", "layoutItems", "field"])
            .iter()
            .filter_map(|e| e.text.as_deref())
            .collect();
        assert_eq!(fields, vec!["Name", "Legacy__c"]);
    }

    #[test]
    fn mismatched_tags_are_errors() {
        let err = parse("<a><b></a>").unwrap_err();
        assert_eq!(err.code.as_str(), "internal.xml_error");
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(parse("").is_err());
        assert!(parse("<open>").is_err());
    }
}

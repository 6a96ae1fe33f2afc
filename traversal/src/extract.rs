//! Terminal extractors: read the literal a generated client declaration
//! carries, without asking the language server anything.

use callscout_types::{Endpoint, Extracted, ParsedFile};

/// Pulls the discovered literal out of a terminal function.
pub trait Extractor: Send + Sync {
    /// Short label for logs.
    fn label(&self) -> &'static str;

    /// `None` when the declaration does not carry what this extractor looks
    /// for; the traversal then keeps expanding.
    fn extract(&self, file: &ParsedFile, function: &str, line: u32) -> Option<Extracted>;
}

/// Reads `Method:` and `PathPattern:` from a swagger client operation.
///
/// ```go
/// op := &runtime.ClientOperation{
///     Method:      "POST",
///     PathPattern: "/storage/volumes",
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct EndpointExtractor;

impl Extractor for EndpointExtractor {
    fn label(&self) -> &'static str {
        "endpoint"
    }

    fn extract(&self, file: &ParsedFile, function: &str, line: u32) -> Option<Extracted> {
        let decl = file.function(function, line)?;
        let mut verb = None;
        let mut path = None;
        for text in decl.text.lines() {
            if verb.is_none() {
                verb = keyed_literal(text, "Method");
            }
            if path.is_none() {
                path = keyed_literal(text, "PathPattern");
            }
            if verb.is_some() && path.is_some() {
                break;
            }
        }
        Some(Extracted::Endpoint(Endpoint::new(verb?, path?)))
    }
}

/// `Key: "value",` on one line gives `value`.
fn keyed_literal(line: &str, key: &str) -> Option<String> {
    let rest = line.trim().strip_prefix(key)?.trim_start().strip_prefix(':')?;
    let literal = rest.trim().trim_end_matches(',').trim_end();
    let value = literal.strip_prefix('"')?.strip_suffix('"')?;
    (!value.is_empty()).then(|| value.to_string())
}

/// Reads the command name from the `xml.Name` field tag of the method's
/// receiver struct.
///
/// ```go
/// type VolumeCreateRequest struct {
///     XMLName xml.Name `xml:"volume-create"`
/// }
/// func (o *VolumeCreateRequest) ExecuteUsing(...)
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandExtractor;

impl Extractor for CommandExtractor {
    fn label(&self) -> &'static str {
        "command"
    }

    fn extract(&self, file: &ParsedFile, function: &str, line: u32) -> Option<Extracted> {
        let decl = file.function(function, line)?;
        let receiver = decl.receiver.as_deref()?;
        let request = file.struct_decl(receiver)?;
        let name = request
            .fields
            .iter()
            .filter(|field| field.type_text == "xml.Name")
            .find_map(|field| field.tag.as_deref().and_then(xml_tag_name))?;
        Some(Extracted::Command { name })
    }
}

/// `` `xml:"volume-create"` `` gives `volume-create`; options after a comma
/// are dropped.
fn xml_tag_name(tag: &str) -> Option<String> {
    let tag = tag.trim_matches('`');
    let (_, rest) = tag.split_once("xml:\"")?;
    let (value, _) = rest.split_once('"')?;
    let name = value.split(',').next().unwrap_or(value).trim();
    (!name.is_empty()).then(|| name.to_string())
}

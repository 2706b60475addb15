//! Minimal reader for `PROPFIND` multistatus bodies.

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::transport::TransportError;

pub(crate) const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop>
    <d:resourcetype/>
    <d:getcontentlength/>
    <d:getlastmodified/>
  </d:prop>
</d:propfind>"#;

/// One `<d:response>` element.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct PropEntry {
    pub href: String,
    pub size: u64,
    pub last_modified: String,
    pub is_dir: bool,
}

impl PropEntry {
    /// Last path segment of the href.
    pub fn basename(&self) -> &str {
        self.href
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }
}

pub(crate) fn parse_multistatus(body: &str) -> Result<Vec<PropEntry>, TransportError> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<PropEntry> = None;
    let mut element: Vec<u8> = Vec::new();
    let mut saw_multistatus = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.local_name().as_ref().to_vec();
                match name.as_slice() {
                    b"multistatus" => saw_multistatus = true,
                    b"response" => current = Some(PropEntry::default()),
                    b"collection" => mark_dir(&mut current),
                    _ => {}
                }
                element = name;
            }
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"collection" {
                    mark_dir(&mut current);
                }
            }
            Ok(Event::Text(t)) => {
                let Some(entry) = current.as_mut() else {
                    continue;
                };
                let text = t
                    .unescape()
                    .map_err(|e| TransportError::Malformed(e.to_string()))?;
                match element.as_slice() {
                    b"href" => entry.href = text.into_owned(),
                    b"getcontentlength" => entry.size = text.trim().parse().unwrap_or(0),
                    b"getlastmodified" => entry.last_modified = text.into_owned(),
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"response" {
                    if let Some(entry) = current.take() {
                        entries.push(entry);
                    }
                }
                element.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(TransportError::Malformed(e.to_string())),
            _ => {}
        }
    }

    if !saw_multistatus {
        return Err(TransportError::Malformed(
            "response has no multistatus element".to_owned(),
        ));
    }
    Ok(entries)
}

fn mark_dir(current: &mut Option<PropEntry>) {
    if let Some(entry) = current.as_mut() {
        entry.is_dir = true;
    }
}

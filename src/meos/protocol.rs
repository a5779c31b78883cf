//! MOP wire format decoding
//!
//! The upstream information server answers with an XML document whose
//! root is either `MOPComplete` (full snapshot) or `MOPDiff`
//! (incremental). Transport records keep every field as the string the
//! feed sent; numeric coercion happens in the conversion layer so one
//! malformed attribute never aborts a cycle.

use quick_xml::events::{BytesStart, Event as XmlEvent};
use quick_xml::Reader;

use crate::error::{Error, Result};

/// Which envelope the upstream sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MopKind {
    Complete,
    Diff,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MopCompetition {
    pub date: String,
    pub organizer: String,
    pub zero_time: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MopControl {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MopClass {
    pub id: String,
    pub order: String,
    /// Comma-separated radio control IDs.
    pub radio: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MopOrg {
    pub id: String,
    pub nationality: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MopCompetitor {
    pub id: String,
    pub card: String,
    pub org: String,
    pub class: String,
    pub status: String,
    /// Deciseconds past the event zero time.
    pub start_time: String,
    pub running_time: String,
    pub name: String,
    /// `controlID,deciseconds` pairs separated by `;`.
    pub radio: String,
}

/// A decoded MOP envelope.
#[derive(Debug, Clone)]
pub struct MopDocument {
    pub kind: MopKind,
    /// Cursor for the next poll; empty when the envelope carried none.
    pub next_difference: String,
    pub competition: Option<MopCompetition>,
    pub controls: Vec<MopControl>,
    pub classes: Vec<MopClass>,
    pub organizations: Vec<MopOrg>,
    pub competitors: Vec<MopCompetitor>,
}

fn attr(element: &BytesStart<'_>, name: &str) -> String {
    for attr in element.attributes().flatten() {
        if attr.key.as_ref() == name.as_bytes() {
            return attr.unescape_value().unwrap_or_default().to_string();
        }
    }
    String::new()
}

fn local_name(element: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(element.local_name().as_ref()).to_string()
}

/// Interpret the first element as the envelope root.
fn root_document(name: &str, element: &BytesStart<'_>) -> Result<MopDocument> {
    let kind = match name {
        "MOPComplete" => MopKind::Complete,
        "MOPDiff" => MopKind::Diff,
        other => return Err(Error::UnknownRoot(other.to_string())),
    };
    Ok(MopDocument {
        kind,
        next_difference: attr(element, "nextdifference"),
        competition: None,
        controls: Vec::new(),
        classes: Vec::new(),
        organizations: Vec::new(),
        competitors: Vec::new(),
    })
}

/// Which element the parser is currently collecting chardata for.
enum TextTarget {
    None,
    Competition,
    Control,
    Class,
    Org,
    CompetitorBase,
    CompetitorRadio,
}

/// Decode a MOP envelope.
///
/// Fails on malformed XML or an unrecognized root element; unknown
/// child elements (teams, input records) are skipped.
pub fn parse_document(xml: &str) -> Result<MopDocument> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut document: Option<MopDocument> = None;
    let mut target = TextTarget::None;

    let mut competition = MopCompetition::default();
    let mut control = MopControl::default();
    let mut class = MopClass::default();
    let mut org = MopOrg::default();
    let mut competitor = MopCompetitor::default();

    loop {
        match reader.read_event()? {
            XmlEvent::Start(e) => {
                let name = local_name(&e);

                if document.is_none() {
                    document = Some(root_document(&name, &e)?);
                    continue;
                }

                match name.as_str() {
                    "competition" => {
                        competition = MopCompetition {
                            date: attr(&e, "date"),
                            organizer: attr(&e, "organizer"),
                            zero_time: attr(&e, "zerotime"),
                            name: String::new(),
                        };
                        target = TextTarget::Competition;
                    }
                    "ctrl" => {
                        control = MopControl {
                            id: attr(&e, "id"),
                            name: String::new(),
                        };
                        target = TextTarget::Control;
                    }
                    "cls" => {
                        class = MopClass {
                            id: attr(&e, "id"),
                            order: attr(&e, "ord"),
                            radio: attr(&e, "radio"),
                            name: String::new(),
                        };
                        target = TextTarget::Class;
                    }
                    "org" => {
                        org = MopOrg {
                            id: attr(&e, "id"),
                            nationality: attr(&e, "nat"),
                            name: String::new(),
                        };
                        target = TextTarget::Org;
                    }
                    "cmp" => {
                        competitor = MopCompetitor {
                            id: attr(&e, "id"),
                            card: attr(&e, "card"),
                            ..Default::default()
                        };
                    }
                    "base" => {
                        competitor.org = attr(&e, "org");
                        competitor.class = attr(&e, "cls");
                        competitor.status = attr(&e, "stat");
                        competitor.start_time = attr(&e, "st");
                        competitor.running_time = attr(&e, "rt");
                        target = TextTarget::CompetitorBase;
                    }
                    "radio" => {
                        target = TextTarget::CompetitorRadio;
                    }
                    // Teams, input records and anything newer than this
                    // decoder carry no domain entity.
                    _ => {}
                }
            }
            // Self-closing elements carry attributes but no chardata.
            XmlEvent::Empty(e) => {
                let name = local_name(&e);

                if document.is_none() {
                    document = Some(root_document(&name, &e)?);
                    continue;
                }
                let Some(doc) = document.as_mut() else {
                    continue;
                };

                match name.as_str() {
                    "competition" => {
                        doc.competition = Some(MopCompetition {
                            date: attr(&e, "date"),
                            organizer: attr(&e, "organizer"),
                            zero_time: attr(&e, "zerotime"),
                            name: String::new(),
                        });
                    }
                    "ctrl" => doc.controls.push(MopControl {
                        id: attr(&e, "id"),
                        name: String::new(),
                    }),
                    "cls" => doc.classes.push(MopClass {
                        id: attr(&e, "id"),
                        order: attr(&e, "ord"),
                        radio: attr(&e, "radio"),
                        name: String::new(),
                    }),
                    "org" => doc.organizations.push(MopOrg {
                        id: attr(&e, "id"),
                        nationality: attr(&e, "nat"),
                        name: String::new(),
                    }),
                    "cmp" => doc.competitors.push(MopCompetitor {
                        id: attr(&e, "id"),
                        card: attr(&e, "card"),
                        ..Default::default()
                    }),
                    "base" => {
                        competitor.org = attr(&e, "org");
                        competitor.class = attr(&e, "cls");
                        competitor.status = attr(&e, "stat");
                        competitor.start_time = attr(&e, "st");
                        competitor.running_time = attr(&e, "rt");
                    }
                    _ => {}
                }
            }
            XmlEvent::Text(e) => {
                let text = e.unescape().unwrap_or_default();
                match target {
                    TextTarget::Competition => competition.name.push_str(&text),
                    TextTarget::Control => control.name.push_str(&text),
                    TextTarget::Class => class.name.push_str(&text),
                    TextTarget::Org => org.name.push_str(&text),
                    TextTarget::CompetitorBase => competitor.name.push_str(&text),
                    TextTarget::CompetitorRadio => competitor.radio.push_str(&text),
                    TextTarget::None => {}
                }
            }
            XmlEvent::End(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                let Some(doc) = document.as_mut() else {
                    continue;
                };
                match name.as_str() {
                    "competition" => {
                        doc.competition = Some(std::mem::take(&mut competition));
                    }
                    "ctrl" => doc.controls.push(std::mem::take(&mut control)),
                    "cls" => doc.classes.push(std::mem::take(&mut class)),
                    "org" => doc.organizations.push(std::mem::take(&mut org)),
                    "cmp" => doc.competitors.push(std::mem::take(&mut competitor)),
                    _ => {}
                }
                target = TextTarget::None;
            }
            XmlEvent::Eof => break,
            _ => {}
        }
    }

    document.ok_or_else(|| Error::UnknownRoot("empty document".to_string()))
}

//! Microsoft Project XML (MSPDI) codec (spec.md §4.3, §6.1).
//!
//! Ingest deserializes the wire format into typed DTOs distinct from the
//! domain model, then converts with `PredecessorUID` resolved against an
//! in-document UID -> outline-number map. Export never re-serializes the
//! whole document: it re-parses the project's retained template as a
//! generic XML event stream and splices in freshly rendered `Task`
//! elements, so every element the codec doesn't model survives untouched.

use chrono::NaiveDate;
use quick_xml::events::Event;
use quick_xml::{Reader, Writer};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt::Write as _;
use thiserror::Error;

use utf8proj_core::{new_id, outline_level_of, parse_outline, Deadline, LinkType, PredecessorLink, Project, Task};

#[derive(Debug, Error)]
pub enum MspdiError {
    #[error("malformed MSPDI document: {0}")]
    Xml(String),
    #[error("failed to render MSPDI document: {0}")]
    Render(String),
    #[error("cancelled")]
    Cancelled,
}

// ============================================================================
// Wire DTOs (ingest side)
// ============================================================================

#[derive(Debug, Deserialize, Default)]
struct WireProject {
    #[serde(rename = "Name", default)]
    name: Option<String>,
    #[serde(rename = "StartDate", default)]
    start_date: Option<String>,
    #[serde(rename = "StatusDate", default)]
    status_date: Option<String>,
    #[serde(rename = "Tasks", default)]
    tasks: Option<WireTasks>,
}

#[derive(Debug, Deserialize, Default)]
struct WireTasks {
    #[serde(rename = "Task", default)]
    task: Vec<WireTask>,
}

#[derive(Debug, Deserialize, Default)]
struct WireTask {
    #[serde(rename = "UID", default)]
    uid: Option<String>,
    #[serde(rename = "Name", default)]
    name: Option<String>,
    #[serde(rename = "OutlineNumber", default)]
    outline_number: Option<String>,
    #[serde(rename = "OutlineLevel", default)]
    outline_level: Option<u32>,
    #[serde(rename = "Duration", default)]
    duration: Option<String>,
    #[serde(rename = "Milestone", default)]
    milestone: Option<String>,
    #[serde(rename = "Summary", default)]
    summary: Option<String>,
    #[serde(rename = "PercentComplete", default)]
    percent_complete: Option<u8>,
    #[serde(rename = "Start", default)]
    start: Option<String>,
    #[serde(rename = "Finish", default)]
    finish: Option<String>,
    #[serde(rename = "ActualStart", default)]
    actual_start: Option<String>,
    #[serde(rename = "ActualFinish", default)]
    actual_finish: Option<String>,
    #[serde(rename = "ActualDuration", default)]
    actual_duration: Option<String>,
    #[serde(rename = "CreateDate", default)]
    create_date: Option<String>,
    #[serde(rename = "PredecessorLink", default)]
    predecessor_links: Vec<WirePredecessorLink>,
}

#[derive(Debug, Deserialize, Default)]
struct WirePredecessorLink {
    #[serde(rename = "PredecessorUID", default)]
    predecessor_uid: Option<String>,
    #[serde(rename = "Type", default)]
    link_type: Option<i64>,
    #[serde(rename = "LinkLag", default)]
    link_lag: Option<i64>,
    #[serde(rename = "LagFormat", default)]
    lag_format: Option<i32>,
}

fn parse_ms_bool(s: &str) -> bool {
    matches!(s.trim(), "1" | "true" | "True" | "TRUE")
}

fn parse_ms_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .ok()
}

fn format_ms_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%dT00:00:00").to_string()
}

// ============================================================================
// Ingest
// ============================================================================

/// Parse an MSPDI document into a `Project` and its `Task`s. `project_id`
/// is supplied by the caller (the store assigns identities); the document
/// bytes are retained verbatim as the project's export template.
pub fn ingest(xml: &str, project_id: &str, deadline: Deadline) -> Result<(Project, Vec<Task>), MspdiError> {
    tracing::debug!(bytes = xml.len(), "parsing MSPDI document");

    let wire: WireProject = quick_xml::de::from_str(xml).map_err(|e| MspdiError::Xml(e.to_string()))?;

    let name = wire.name.unwrap_or_else(|| "Imported Project".to_string());
    let start = wire
        .start_date
        .as_deref()
        .and_then(parse_ms_date)
        .unwrap_or_else(|| chrono::Utc::now().date_naive());
    let status_date = wire.status_date.as_deref().and_then(parse_ms_date).unwrap_or(start);

    let now = chrono::Utc::now();
    let project = Project {
        id: project_id.to_string(),
        name,
        start,
        status_date,
        created_at: now,
        updated_at: now,
        is_active: false,
        xml_template: xml.to_string(),
    };

    let wire_tasks = wire.tasks.unwrap_or_default().task;

    let mut uid_to_outline: HashMap<String, String> = HashMap::new();
    for wt in &wire_tasks {
        if let (Some(uid), Some(outline)) = (&wt.uid, &wt.outline_number) {
            uid_to_outline.insert(uid.clone(), outline.clone());
        }
    }

    let mut tasks = Vec::with_capacity(wire_tasks.len());
    for (i, wt) in wire_tasks.into_iter().enumerate() {
        if i % 64 == 0 {
            deadline.check().map_err(|_| MspdiError::Cancelled)?;
        }

        let outline_number = wt.outline_number.clone().unwrap_or_default();
        let milestone = wt.milestone.as_deref().map(parse_ms_bool).unwrap_or(false);
        let summary = wt.summary.as_deref().map(parse_ms_bool).unwrap_or(false);

        let mut duration = wt.duration.unwrap_or_else(|| "PT0H0M0S".to_string());
        if milestone {
            // Milestones round-trip with zero duration even if the source
            // omitted the element entirely (spec.md §8 boundary case).
            duration = "PT0H0M0S".to_string();
        }

        let predecessors = wt
            .predecessor_links
            .iter()
            .filter_map(|pl| {
                let predecessor_outline = pl
                    .predecessor_uid
                    .as_ref()
                    .and_then(|uid| uid_to_outline.get(uid))
                    .cloned()?;
                let link_type = LinkType::from_wire(pl.link_type.unwrap_or(1))?;
                Some(PredecessorLink {
                    project_id: project_id.to_string(),
                    predecessor_outline,
                    link_type,
                    lag: pl.link_lag.unwrap_or(0),
                    lag_format: pl.lag_format.unwrap_or(7),
                })
            })
            .collect();

        let outline_level = wt.outline_level.unwrap_or_else(|| outline_level_of(&outline_number));

        tasks.push(Task {
            id: new_id(),
            project_id: project_id.to_string(),
            uid: wt.uid,
            name: wt.name.unwrap_or_default(),
            outline_number,
            outline_level,
            duration,
            value: None,
            milestone,
            summary,
            percent_complete: wt.percent_complete.unwrap_or(0),
            start: wt.start.as_deref().and_then(parse_ms_date),
            finish: wt.finish.as_deref().and_then(parse_ms_date),
            actual_start: wt.actual_start.as_deref().and_then(parse_ms_date),
            actual_finish: wt.actual_finish.as_deref().and_then(parse_ms_date),
            actual_duration: wt.actual_duration,
            create_date: wt.create_date.as_deref().and_then(parse_ms_date),
            predecessors,
        });
    }

    Ok((project, tasks))
}

// ============================================================================
// Export
// ============================================================================

/// Render the project's current tasks back into its retained template,
/// preserving every element the codec does not model (spec.md §4.3).
pub fn export(project: &Project, tasks: &[Task]) -> Result<String, MspdiError> {
    tracing::debug!(project_id = %project.id, tasks = tasks.len(), "rendering MSPDI document");

    let mut sorted: Vec<&Task> = tasks.iter().collect();
    sorted.sort_by(|a, b| compare_outline(&a.outline_number, &b.outline_number));

    let outline_to_uid: HashMap<&str, String> = sorted
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let uid = t.uid.clone().unwrap_or_else(|| (i + 1).to_string());
            (t.outline_number.as_str(), uid)
        })
        .collect();

    let mut tasks_xml = String::new();
    for task in &sorted {
        let uid = outline_to_uid
            .get(task.outline_number.as_str())
            .cloned()
            .unwrap_or_default();
        render_task(&mut tasks_xml, task, &uid, &outline_to_uid);
    }

    splice_tasks(&project.xml_template, &tasks_xml)
}

fn compare_outline(a: &str, b: &str) -> std::cmp::Ordering {
    let sa = parse_outline(a).unwrap_or_default();
    let sb = parse_outline(b).unwrap_or_default();
    sa.cmp(&sb)
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn render_task(out: &mut String, task: &Task, uid: &str, outline_to_uid: &HashMap<&str, String>) {
    let _ = write!(out, "<Task>");
    let _ = write!(out, "<UID>{}</UID>", escape_xml(uid));
    let _ = write!(out, "<Name>{}</Name>", escape_xml(&task.name));
    let _ = write!(out, "<OutlineNumber>{}</OutlineNumber>", task.outline_number);
    let _ = write!(out, "<OutlineLevel>{}</OutlineLevel>", task.outline_level);
    let _ = write!(out, "<Duration>{}</Duration>", task.duration);
    let _ = write!(out, "<Milestone>{}</Milestone>", if task.milestone { 1 } else { 0 });
    let _ = write!(out, "<Summary>{}</Summary>", if task.summary { 1 } else { 0 });
    let _ = write!(out, "<PercentComplete>{}</PercentComplete>", task.percent_complete);
    if let Some(d) = task.start {
        let _ = write!(out, "<Start>{}</Start>", format_ms_date(d));
    }
    if let Some(d) = task.finish {
        let _ = write!(out, "<Finish>{}</Finish>", format_ms_date(d));
    }
    if let Some(d) = task.actual_start {
        let _ = write!(out, "<ActualStart>{}</ActualStart>", format_ms_date(d));
    }
    if let Some(d) = task.actual_finish {
        let _ = write!(out, "<ActualFinish>{}</ActualFinish>", format_ms_date(d));
    }
    if let Some(ad) = &task.actual_duration {
        let _ = write!(out, "<ActualDuration>{}</ActualDuration>", ad);
    }
    if let Some(d) = task.create_date {
        let _ = write!(out, "<CreateDate>{}</CreateDate>", format_ms_date(d));
    }
    for link in &task.predecessors {
        let pred_uid = outline_to_uid
            .get(link.predecessor_outline.as_str())
            .cloned()
            .unwrap_or_default();
        let _ = write!(
            out,
            "<PredecessorLink><PredecessorUID>{}</PredecessorUID><Type>{}</Type><LinkLag>{}</LinkLag><LagFormat>{}</LagFormat></PredecessorLink>",
            escape_xml(&pred_uid),
            link.link_type.to_wire(),
            link.lag,
            link.lag_format
        );
    }
    let _ = write!(out, "</Task>");
}

/// Replace the children of the template's `<Tasks>` element with `tasks_xml`,
/// leaving every other element byte-for-byte untouched.
fn splice_tasks(template: &str, tasks_xml: &str) -> Result<String, MspdiError> {
    let mut reader = Reader::from_str(template);
    reader.trim_text(false);
    let mut writer = Writer::new(Vec::new());
    // -1: outside Tasks. 0: just inside Tasks' own start tag. >0: inside a
    // nested element within Tasks, tracked only to find the matching close.
    let mut depth_in_tasks: i32 = -1;

    loop {
        let event = reader.read_event().map_err(|e| MspdiError::Xml(e.to_string()))?;
        match event {
            Event::Eof => break,
            Event::Start(e) => {
                if depth_in_tasks < 0 && e.name().local_name().as_ref() == b"Tasks" {
                    writer
                        .write_event(Event::Start(e.clone()))
                        .map_err(|err| MspdiError::Render(err.to_string()))?;
                    writer.get_mut().extend_from_slice(tasks_xml.as_bytes());
                    depth_in_tasks = 0;
                    continue;
                }
                if depth_in_tasks >= 0 {
                    depth_in_tasks += 1;
                    continue;
                }
                writer
                    .write_event(Event::Start(e))
                    .map_err(|err| MspdiError::Render(err.to_string()))?;
            }
            Event::Empty(e) => {
                if depth_in_tasks < 0 && e.name().local_name().as_ref() == b"Tasks" {
                    let name = e.name().as_ref().to_vec();
                    writer.get_mut().extend_from_slice(b"<");
                    writer.get_mut().extend_from_slice(&name);
                    writer.get_mut().extend_from_slice(b">");
                    writer.get_mut().extend_from_slice(tasks_xml.as_bytes());
                    writer.get_mut().extend_from_slice(b"</");
                    writer.get_mut().extend_from_slice(&name);
                    writer.get_mut().extend_from_slice(b">");
                    continue;
                }
                if depth_in_tasks >= 0 {
                    continue;
                }
                writer
                    .write_event(Event::Empty(e))
                    .map_err(|err| MspdiError::Render(err.to_string()))?;
            }
            Event::End(e) => {
                if depth_in_tasks == 0 && e.name().local_name().as_ref() == b"Tasks" {
                    writer
                        .write_event(Event::End(e))
                        .map_err(|err| MspdiError::Render(err.to_string()))?;
                    depth_in_tasks = -1;
                    continue;
                }
                if depth_in_tasks > 0 {
                    depth_in_tasks -= 1;
                    continue;
                }
                writer
                    .write_event(Event::End(e))
                    .map_err(|err| MspdiError::Render(err.to_string()))?;
            }
            other => {
                if depth_in_tasks >= 0 {
                    continue;
                }
                writer
                    .write_event(other)
                    .map_err(|err| MspdiError::Render(err.to_string()))?;
            }
        }
    }

    String::from_utf8(writer.into_inner()).map_err(|e| MspdiError::Render(e.to_string()))
}

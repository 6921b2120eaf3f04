//! End-to-end scenarios from spec.md §8, driven entirely through the
//! `Engine` facade against a temp-file store.

use utf8proj_core::{Deadline, EngineError};
use utf8proj_engine::{Change, Engine, NewTaskFields, StrategyKind};
use utf8proj_store::Store;

fn temp_engine() -> (Engine, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path().join("scenario.db")).unwrap();
    (Engine::from_store(store), dir)
}

const TRIVIAL_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Project xmlns="http://schemas.microsoft.com/project">
  <Name>Trivial</Name>
  <StartDate>2026-01-05T00:00:00</StartDate>
  <StatusDate>2026-01-05T00:00:00</StatusDate>
  <Tasks>
    <Task>
      <UID>1</UID>
      <Name>Design</Name>
      <OutlineNumber>1</OutlineNumber>
      <OutlineLevel>1</OutlineLevel>
      <Duration>PT8H0M0S</Duration>
      <Milestone>0</Milestone>
      <Summary>0</Summary>
      <PercentComplete>0</PercentComplete>
    </Task>
    <Task>
      <UID>2</UID>
      <Name>Build</Name>
      <OutlineNumber>2</OutlineNumber>
      <OutlineLevel>1</OutlineLevel>
      <Duration>PT8H0M0S</Duration>
      <Milestone>0</Milestone>
      <Summary>0</Summary>
      <PercentComplete>0</PercentComplete>
      <PredecessorLink>
        <PredecessorUID>1</PredecessorUID>
        <Type>1</Type>
        <LinkLag>0</LinkLag>
        <LagFormat>7</LagFormat>
      </PredecessorLink>
    </Task>
  </Tasks>
</Project>
"#;

/// Scenario 1: parse a trivial two-task project and compute its CPM.
#[test]
fn parse_trivial_project() {
    let (engine, _dir) = temp_engine();
    engine.ingest_xml(TRIVIAL_XML, Deadline::none()).unwrap();

    assert_eq!(engine.list_tasks().unwrap().len(), 2);

    let report = engine.validate().unwrap();
    assert!(report.valid, "{:?}", report.issues);

    let cpm = engine.compute_cpm(Deadline::none()).unwrap();
    assert_eq!(cpm.project_duration_days, 2.0);
    assert_eq!(cpm.tasks.len(), 2);
    assert!(cpm.tasks.iter().all(|t| t.critical));
}

/// Scenario 2: the LagFormat=7/LinkLag=0 regression must never round-trip
/// as 48000 (historical bug: dividing days-format lag by 480).
#[test]
fn lag_format_regression_zero_stays_zero() {
    let (engine, _dir) = temp_engine();
    engine.ingest_xml(TRIVIAL_XML, Deadline::none()).unwrap();

    let exported = engine.export_xml().unwrap();
    let exported = String::from_utf8(exported).unwrap();
    assert!(exported.contains("<LinkLag>0</LinkLag>"));
    assert!(exported.contains("<LagFormat>7</LagFormat>"));
    assert!(!exported.contains("48000"));
}

/// Scenario 3: A -> B -> C -> A must fail validation with a cycle naming
/// all three outlines, and CPM must refuse to run.
///
/// `create_task`/`update_task` each re-validate before committing, so a
/// three-task cycle (which only becomes a cycle once the last link closes
/// the loop) can't be built one engine call at a time — it has to land in
/// the store as a single fait accompli, the way an externally-authored
/// document ingested without validation would. `Store::replace_tasks` is
/// the facility the XML ingest path itself uses for exactly that, so this
/// test drives it directly to set up the scenario, then proves `Engine`
/// catches it on the next call.
#[test]
fn cycle_detection_names_outlines_and_blocks_cpm() {
    let (engine, dir) = temp_engine();
    let project = engine
        .create_project("Cyclic", chrono::NaiveDate::from_ymd_opt(2026, 1, 5).unwrap())
        .unwrap();
    engine.switch_project(&project.id).unwrap();

    let store = Store::open(dir.path().join("scenario.db")).unwrap();
    let link = |from: &str| utf8proj_core::PredecessorLink::new(&project.id, from, utf8proj_core::LinkType::FinishToStart, 0, 7);
    let a = utf8proj_core::Task::new(&project.id, "1", "A").outline_level(1).with_predecessor(link("3"));
    let b = utf8proj_core::Task::new(&project.id, "2", "B").outline_level(1).with_predecessor(link("1"));
    let c = utf8proj_core::Task::new(&project.id, "3", "C").outline_level(1).with_predecessor(link("2"));
    store.replace_tasks(&project.id, &[a, b, c]).unwrap();

    let report = engine.validate().unwrap();
    assert!(!report.valid);
    let cycle_issue = report
        .issues
        .iter()
        .find(|i| i.kind == utf8proj_core::ValidationKind::Cycle)
        .expect("cycle must be reported");
    for outline in ["1", "2", "3"] {
        assert!(cycle_issue.message.contains(outline), "{}", cycle_issue.message);
    }

    assert!(matches!(
        engine.compute_cpm(Deadline::none()),
        Err(EngineError::ValidationError(_))
    ));
}

/// Scenario 4: SS+lag leaves the shorter successor off the critical path.
#[test]
fn start_to_start_with_lag_leaves_shorter_task_off_critical_path() {
    let (engine, _dir) = temp_engine();
    let project = engine
        .create_project("SS Lag", chrono::NaiveDate::from_ymd_opt(2026, 1, 5).unwrap())
        .unwrap();
    engine.switch_project(&project.id).unwrap();

    engine
        .create_task(NewTaskFields::new("1", "T1", 1, "PT80H0M0S"))
        .unwrap();
    engine
        .create_task(NewTaskFields {
            predecessors: vec![utf8proj_core::PredecessorLink::new(
                &project.id,
                "1",
                utf8proj_core::LinkType::StartToStart,
                3,
                7,
            )],
            ..NewTaskFields::new("2", "T2", 1, "PT40H0M0S")
        })
        .unwrap();

    let cpm = engine.compute_cpm(Deadline::none()).unwrap();
    assert_eq!(cpm.project_duration_days, 10.0);
    let t1 = cpm.tasks.iter().find(|t| t.outline_number == "1").unwrap();
    let t2 = cpm.tasks.iter().find(|t| t.outline_number == "2").unwrap();
    assert_eq!(t1.es, 0.0);
    assert_eq!(t1.ef, 10.0);
    assert_eq!(t2.es, 3.0);
    assert_eq!(t2.ef, 8.0);
    assert!(t1.critical);
    assert!(!t2.critical);
}

/// Scenario 5: lag-reduction strategy proposes a 40% cut and, once applied,
/// CPM reflects the new, shorter duration.
#[test]
fn optimize_lag_reduction_then_apply_shortens_schedule() {
    let (engine, _dir) = temp_engine();
    let project = engine
        .create_project("Optimize", chrono::NaiveDate::from_ymd_opt(2026, 1, 5).unwrap())
        .unwrap();
    engine.switch_project(&project.id).unwrap();

    engine
        .create_task(NewTaskFields::new("1", "T1", 1, "PT80H0M0S"))
        .unwrap();
    engine
        .create_task(NewTaskFields {
            predecessors: vec![utf8proj_core::PredecessorLink::new(
                &project.id,
                "1",
                utf8proj_core::LinkType::FinishToStart,
                100,
                7,
            )],
            ..NewTaskFields::new("2", "T2", 1, "PT80H0M0S")
        })
        .unwrap();

    let before = engine.compute_cpm(Deadline::none()).unwrap();
    let proposal = engine.optimize_proposal(before.project_duration_days - 40.0).unwrap();
    let lag_strategy = proposal
        .strategies
        .iter()
        .find(|s| s.kind == StrategyKind::LagReduction)
        .unwrap();
    assert_eq!(lag_strategy.cost, 0.0);
    assert!(matches!(lag_strategy.risk, utf8proj_engine::Risk::Low));

    let changes: Vec<Change> = lag_strategy.changes.clone();
    engine.optimize_apply(&changes).unwrap();

    let after = engine.compute_cpm(Deadline::none()).unwrap();
    assert!(after.project_duration_days < before.project_duration_days);
}

/// Scenario 6: two projects with overlapping outline numbers never leak
/// into each other, including after one is deleted.
#[test]
fn project_isolation_with_overlapping_outlines() {
    let (engine, _dir) = temp_engine();
    let p1 = engine
        .create_project("P1", chrono::NaiveDate::from_ymd_opt(2026, 1, 5).unwrap())
        .unwrap();
    let p2 = engine
        .create_project("P2", chrono::NaiveDate::from_ymd_opt(2026, 1, 5).unwrap())
        .unwrap();

    engine.switch_project(&p1.id).unwrap();
    for i in 1..=100 {
        engine
            .create_task(NewTaskFields::new(i.to_string(), format!("P1 Task {i}"), 1, "PT8H0M0S"))
            .unwrap();
    }

    engine.switch_project(&p2.id).unwrap();
    for i in 1..=100 {
        engine
            .create_task(NewTaskFields::new(i.to_string(), format!("P2 Task {i}"), 1, "PT8H0M0S"))
            .unwrap();
    }

    engine.switch_project(&p1.id).unwrap();
    assert_eq!(engine.list_tasks().unwrap().len(), 100);
    engine.switch_project(&p2.id).unwrap();
    assert_eq!(engine.list_tasks().unwrap().len(), 100);

    engine.delete_project(&p1.id).unwrap();
    assert_eq!(engine.list_tasks().unwrap().len(), 100);
    assert!(matches!(engine.get_metadata(), Ok(_)));

    engine.switch_project(&p1.id).unwrap_err();
}

/// Deleting the active project falls back to the most-recently-updated
/// remaining project, not to null, when one exists (spec.md §3 Lifecycle).
#[test]
fn deleting_active_project_falls_back_to_most_recently_updated_remaining() {
    let (engine, _dir) = temp_engine();
    let p1 = engine
        .create_project("P1", chrono::NaiveDate::from_ymd_opt(2026, 1, 5).unwrap())
        .unwrap();
    let p2 = engine
        .create_project("P2", chrono::NaiveDate::from_ymd_opt(2026, 1, 5).unwrap())
        .unwrap();

    engine.switch_project(&p2.id).unwrap();
    engine.switch_project(&p1.id).unwrap();

    engine.delete_project(&p1.id).unwrap();

    let meta = engine.get_metadata().unwrap();
    assert_eq!(meta.name, "P2");
}

/// Deleting the last remaining project leaves no active project at all.
#[test]
fn deleting_last_project_leaves_no_active_project() {
    let (engine, _dir) = temp_engine();
    let project = engine
        .create_project("Only", chrono::NaiveDate::from_ymd_opt(2026, 1, 5).unwrap())
        .unwrap();
    engine.switch_project(&project.id).unwrap();

    engine.delete_project(&project.id).unwrap();

    assert!(matches!(engine.get_metadata(), Err(EngineError::NotFound(_))));
}

#[test]
fn deadline_cancellation_does_not_mutate_store() {
    let (engine, _dir) = temp_engine();
    let project = engine
        .create_project("Cancel", chrono::NaiveDate::from_ymd_opt(2026, 1, 5).unwrap())
        .unwrap();
    engine.switch_project(&project.id).unwrap();
    engine
        .create_task(NewTaskFields::new("1", "A", 1, "PT8H0M0S"))
        .unwrap();

    let expired = Deadline::after(std::time::Duration::from_millis(0));
    std::thread::sleep(std::time::Duration::from_millis(5));
    let result = engine.compute_cpm(expired);
    assert!(matches!(result, Err(EngineError::Cancelled)));
    // Store is untouched: task count unchanged.
    assert_eq!(engine.list_tasks().unwrap().len(), 1);
}

mod common;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use common::{oldt_code, pulse_train, FifBuilder};
use emeg::fiff::constants::{FIFFV_MEG_CH, FIFFV_STIM_CH};
use emeg::io::parse_trials;
use emeg::{make_events, process_subject, read_events, ProjectConfig, StimStep, SubjectOutcome};

fn write_run(root: &Path, subject: &str, run: &str, first_samp: i32, codes: &[u32]) {
    let dir = root.join(subject).join("raw");
    fs::create_dir_all(&dir).unwrap();
    let stim = pulse_train(codes, 10, 30);
    let n = stim.len();
    FifBuilder::new(1000.0, first_samp)
        .channel("MEG 001", FIFFV_MEG_CH, vec![0.0; n])
        .channel("STI 014", FIFFV_STIM_CH, stim)
        .write(&dir.join(format!("{subject}_{run}_raw.fif")));
}

fn project(root: &Path) -> ProjectConfig {
    let mut subjects = BTreeMap::new();
    subjects.insert(
        "S01".to_string(),
        vec!["OLDT1".to_string(), "SENT1".to_string(), "OLDT2".to_string()],
    );
    ProjectConfig { data_root: root.to_path_buf(), subjects, ..ProjectConfig::default() }
}

/// Two OLDT runs of one trial each; the SENT run in between is never read.
fn two_runs(root: &Path) {
    write_run(
        root,
        "S01",
        "OLDT1",
        1000,
        &[oldt_code(0, 0, false), oldt_code(1, 0, false), oldt_code(2, 0, true)],
    );
    write_run(
        root,
        "S01",
        "OLDT2",
        500,
        &[oldt_code(0, 1, false), oldt_code(1, 1, false), oldt_code(2, 1, false)],
    );
}

#[test]
fn subject_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    two_runs(dir.path());
    let mut cfg = project(dir.path());
    cfg.write_conditions = true;

    let outcome = process_subject(&cfg, "S01").unwrap();
    assert_eq!(outcome, SubjectOutcome::Written { n_events: 6, n_trials: 2 });

    let mne = dir.path().join("S01").join("mne");
    let master = fs::read_to_string(mne.join("S01_OLDT-eve.txt")).unwrap();
    assert_eq!(
        master,
        "1030 0 128\n1070 0 64\n1110 0 64\n1180 0 128\n1220 0 64\n1260 0 64\n"
    );

    let trials = parse_trials(&fs::read_to_string(mne.join("S01_OLDT_trials.txt")).unwrap()).unwrap();
    let ids: Vec<u32> = trials.iter().map(|r| r.trial_id).collect();
    assert_eq!(ids, vec![1, 1, 2, 2]);
    assert!(trials.iter().all(|r| r.trigger == 64));

    let coreg = read_events(&mne.join("S01_OLDT_coreg-eve.txt")).unwrap();
    let samples: Vec<i64> = coreg.iter().map(|s| s.sample).collect();
    assert_eq!(samples, vec![1070, 1110, 1220, 1260]);

    let conditions = read_events(&mne.join("S01_OLDT_conditions-eve.txt")).unwrap();
    let codes: Vec<u32> = conditions.iter().map(|s| s.code).collect();
    assert_eq!(codes, vec![0, 1, 6, 0, 9, 2]);

    let leftovers: Vec<_> = fs::read_dir(&mne)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".partial"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn existing_files_are_kept_without_redo() {
    let dir = tempfile::tempdir().unwrap();
    two_runs(dir.path());
    let mut cfg = project(dir.path());
    process_subject(&cfg, "S01").unwrap();

    let master = dir.path().join("S01/mne/S01_OLDT-eve.txt");
    fs::write(&master, "edited\n").unwrap();
    cfg.redo = false;
    assert_eq!(process_subject(&cfg, "S01").unwrap(), SubjectOutcome::Skipped);
    assert_eq!(fs::read_to_string(&master).unwrap(), "edited\n");

    cfg.redo = true;
    process_subject(&cfg, "S01").unwrap();
    assert_ne!(fs::read_to_string(&master).unwrap(), "edited\n");
}

#[test]
fn missing_recording_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write_run(dir.path(), "S01", "OLDT1", 0, &[oldt_code(0, 0, false)]);
    let cfg = project(dir.path());

    let err = process_subject(&cfg, "S01").unwrap_err();
    assert!(format!("{err:#}").contains("S01_OLDT2_raw.fif"));
    assert!(!dir.path().join("S01/mne").exists());
}

#[test]
fn unknown_experiment_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    two_runs(dir.path());
    let mut cfg = project(dir.path());
    cfg.experiment = "PICT".into();
    assert!(process_subject(&cfg, "S01").is_err());
}

#[test]
fn decoding_written_steps_matches() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("steps.txt");
    let steps = vec![
        StimStep::new(100, 0, oldt_code(0, 0, false)),
        StimStep::new(110, oldt_code(0, 0, false), 0),
        StimStep::new(400, 0, oldt_code(1, 2, true)),
        StimStep::new(700, 0, oldt_code(2, 2, true)),
    ];
    emeg::write_events(&path, &steps).unwrap();
    let read = read_events(&path).unwrap();
    assert_eq!(read, steps);

    let ev = make_events(&read, "OLDT").unwrap();
    let conds: Vec<u32> = ev.master.iter().map(|e| e.condition).collect();
    assert_eq!(conds, vec![0, 5, 10]);
}

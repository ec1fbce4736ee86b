//! JSON column files read through `JsonFileSource`.

use std::path::PathBuf;

use hp_event::{ColumnSet, EntrySpec, EventSource, Histogram, JsonFileSource, NamedFunc, Schema};

fn write_set(dir: &std::path::Path, name: &str, set: &ColumnSet) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_string(set).unwrap()).unwrap();
    path
}

#[test]
fn directory_source_reads_every_file_in_order() {
    let dir = tempfile::tempdir().unwrap();
    write_set(
        dir.path(),
        "b_events.json",
        &ColumnSet::new()
            .with_scalar("ht", vec![800.0])
            .with_vector("jets_pt", vec![vec![300.0, 40.0, 35.0]]),
    );
    write_set(
        dir.path(),
        "a_events.json",
        &ColumnSet::new()
            .with_scalar("ht", vec![450.0, 1200.0])
            .with_vector("jets_pt", vec![vec![200.0], vec![600.0, 25.0]]),
    );
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let src = JsonFileSource::from_dir(dir.path(), "_events.json");
    let mut reader = src.open().unwrap();
    let mut hts = Vec::new();
    while let Some(ev) = reader.next_event().unwrap() {
        hts.push(ev.scalar("ht").unwrap());
    }
    assert_eq!(hts, vec![450.0, 1200.0, 800.0]);
    assert_eq!(src.open_count(), 1);
}

#[test]
fn jet_histogram_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let f = write_set(
        dir.path(),
        "ev.json",
        &ColumnSet::new()
            .with_scalar("weight", vec![0.5, 2.0])
            .with_vector("jets_pt", vec![vec![120.0, 20.0, 45.0], vec![35.0]]),
    );
    let schema = Schema::new().with_scalar("weight").with_vector("jets_pt");
    let spec = EntrySpec::new(
        NamedFunc::parse("jets_pt > 30", &schema).unwrap(),
        NamedFunc::parse("weight", &schema).unwrap(),
        vec![NamedFunc::parse("jets_pt", &schema).unwrap()],
    );

    let src = JsonFileSource::new(vec![f]);
    let mut h = Histogram::uniform("jets_pt", 4, 0.0, 200.0).unwrap();
    let mut reader = src.open().unwrap();
    while let Some(ev) = reader.next_event().unwrap() {
        spec.for_each_entry(ev, |w, v| h.fill(v[0], w)).unwrap();
    }
    assert_eq!(h.bin_content, vec![2.5, 0.0, 0.5, 0.0]);
    assert_eq!(h.entries, 3);
}

#[test]
fn empty_directory_is_a_data_error() {
    let dir = tempfile::tempdir().unwrap();
    let src = JsonFileSource::from_dir(dir.path(), ".json");
    let err = src.open().err().unwrap();
    assert!(matches!(err, hp_core::Error::DataAvailability(_)), "{err}");
}

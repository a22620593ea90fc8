// Canonical snapshot round-trips: the item/part lists reconstruct
// structurally equal models, through serde_json and a real file.

use std::fs;
use std::io::Write;

use leadsheet::models::{Annotation, ItemData, Position, Section, TimeSignature};
use leadsheet::{
    EditError, LeadSheet, LeadSheetSnapshot, NewPart, Rhythm, SongStructure,
    SongStructureSnapshot, UnsupportedEdit,
};
use num_rational::Rational32;

fn chord(text: &str) -> ItemData {
    ItemData::ChordSymbol(text.parse().unwrap())
}

fn sample_sheet() -> LeadSheet {
    let mut cls =
        LeadSheet::with_opening_section(12, Section::new("Head", TimeSignature::four_four()))
            .unwrap();
    cls.add_section(Section::new("Waltz", TimeSignature::three_four()), 8)
        .unwrap();
    cls.add_item(chord("Dm7"), Position::bar_start(0)).unwrap();
    cls.add_item(chord("G7/B"), Position::new(1, Rational32::new(1, 2)))
        .unwrap();
    cls.add_item(chord("Cmaj7"), Position::new(9, Rational32::new(5, 3)))
        .unwrap();
    cls.add_item(
        ItemData::Annotation(Annotation::new("solo over the waltz")),
        Position::bar_start(8),
    )
    .unwrap();
    cls
}

#[test]
fn test_sheet_snapshot_reconstructs_equal_model() {
    let cls = sample_sheet();
    let snapshot = cls.snapshot();

    let rebuilt = LeadSheet::from_snapshot(&snapshot).unwrap();

    assert_eq!(rebuilt.snapshot(), snapshot);
    assert_eq!(rebuilt.size_in_bars(), 12);
    assert_eq!(
        rebuilt.time_signature_at(9),
        Some(TimeSignature::three_four())
    );
}

#[test]
fn test_sheet_json_round_trip_through_file() {
    let cls = sample_sheet();
    let snapshot = cls.snapshot();
    let json = serde_json::to_string_pretty(&snapshot).unwrap();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();

    let loaded = fs::read_to_string(file.path()).unwrap();
    let decoded: LeadSheetSnapshot = serde_json::from_str(&loaded).unwrap();
    let rebuilt = LeadSheet::from_snapshot(&decoded).unwrap();

    assert_eq!(rebuilt.snapshot(), snapshot);
}

#[test]
fn test_rational_beats_survive_serialization() {
    let cls = sample_sheet();
    let json = serde_json::to_string(&cls.snapshot()).unwrap();
    let decoded: LeadSheetSnapshot = serde_json::from_str(&json).unwrap();

    // 5/3 must come back exactly, not as a rounded float
    let thirds = decoded
        .items
        .iter()
        .find(|item| item.position.beat == Rational32::new(5, 3));
    assert!(thirds.is_some());
}

#[test]
fn test_corrupt_snapshot_is_rejected() {
    let mut snapshot = sample_sheet().snapshot();

    // Drop the opening section: no longer reconstructible
    snapshot
        .items
        .retain(|item| item.position != Position::bar_start(0) || !item.data.is_section());

    assert_eq!(
        LeadSheet::from_snapshot(&snapshot).unwrap_err(),
        EditError::Unsupported(UnsupportedEdit::WouldOrphanOpening)
    );
}

#[test]
fn test_song_structure_json_round_trip() {
    let mut sgs = SongStructure::new();
    sgs.add_parts(vec![
        NewPart {
            start_bar: 0,
            nb_bars: 8,
            rhythm: Rhythm::new("MediumSwing", TimeSignature::four_four()),
            parent_section: Section::new("Head", TimeSignature::four_four()),
        },
        NewPart {
            start_bar: 8,
            nb_bars: 4,
            rhythm: Rhythm::new("JazzWaltz", TimeSignature::three_four()),
            parent_section: Section::new("Waltz", TimeSignature::three_four()),
        },
    ])
    .unwrap();

    let snapshot = sgs.snapshot();
    let json = serde_json::to_string(&snapshot).unwrap();
    let decoded: SongStructureSnapshot = serde_json::from_str(&json).unwrap();
    let rebuilt = SongStructure::from_snapshot(&decoded).unwrap();

    assert_eq!(rebuilt.snapshot(), snapshot);
    assert_eq!(rebuilt.size_in_bars(), 12);
}

#[test]
fn test_gapped_song_structure_snapshot_is_rejected() {
    let mut sgs = SongStructure::new();
    sgs.add_parts(vec![NewPart {
        start_bar: 0,
        nb_bars: 4,
        rhythm: Rhythm::new("MediumSwing", TimeSignature::four_four()),
        parent_section: Section::new("A", TimeSignature::four_four()),
    }])
    .unwrap();

    let mut snapshot = sgs.snapshot();
    snapshot.parts[0].start_bar = 2; // gap before the first part

    let err = SongStructure::from_snapshot(&snapshot).unwrap_err();
    assert!(matches!(
        err,
        EditError::Unsupported(UnsupportedEdit::NonContiguousPart { .. })
    ));
}

// Arrangement-level scenarios: the part vocabulary against a lead
// sheet's sections, contiguity under mixed edits, and event brackets.

use std::cell::RefCell;
use std::rc::Rc;

use leadsheet::models::{Section, TimeSignature};
use leadsheet::{
    ActionEvent, EditError, NewPart, Rhythm, SongStructure, SongStructureEvent, UnsupportedEdit,
};

fn part(start_bar: usize, nb_bars: usize, section: &str, rhythm: &str) -> NewPart {
    NewPart {
        start_bar,
        nb_bars,
        rhythm: Rhythm::new(rhythm, TimeSignature::four_four()),
        parent_section: Section::new(section, TimeSignature::four_four()),
    }
}

/// Typical two-chorus arrangement: A and B sections, swing rhythm.
fn aaba() -> (SongStructure, Vec<leadsheet::PartId>) {
    let mut sgs = SongStructure::new();
    let ids = sgs
        .add_parts(vec![
            part(0, 8, "A1", "MediumSwing"),
            part(8, 8, "A2", "MediumSwing"),
            part(16, 8, "B", "MediumSwing"),
            part(24, 8, "A3", "MediumSwing"),
        ])
        .unwrap();
    (sgs, ids)
}

fn assert_contiguous(sgs: &SongStructure) {
    let mut expected = 0;
    for part in sgs.parts() {
        assert_eq!(part.start_bar(), expected, "gap before {}", part.name());
        expected = part.bars().end;
    }
    assert_eq!(expected, sgs.size_in_bars());
}

#[test]
fn test_arrangement_stays_contiguous_under_mixed_edits() {
    let (mut sgs, ids) = aaba();
    assert_eq!(sgs.size_in_bars(), 32);
    assert_contiguous(&sgs);

    sgs.resize_parts(&[(ids[1], 12)]).unwrap();
    assert_contiguous(&sgs);

    sgs.remove_parts(&[ids[0], ids[2]]).unwrap();
    assert_contiguous(&sgs);

    sgs.add_parts(vec![part(0, 4, "Intro", "MediumSwing")])
        .unwrap();
    assert_contiguous(&sgs);

    assert_eq!(sgs.size_in_bars(), 4 + 12 + 8);
}

#[test]
fn test_part_lookup_by_bar() {
    let (sgs, ids) = aaba();
    assert_eq!(sgs.part_at(0).unwrap().id(), ids[0]);
    assert_eq!(sgs.part_at(15).unwrap().id(), ids[1]);
    assert_eq!(sgs.part_at(16).unwrap().id(), ids[2]);
    assert!(sgs.part_at(32).is_none());
}

#[test]
fn test_replace_range_rhythm_change() {
    // "Change the rhythm of the bridge": one compound replace
    let (mut sgs, ids) = aaba();

    let mut bossa = part(16, 8, "B2", "Bossa");
    bossa.rhythm = Rhythm::new("Bossa", TimeSignature::four_four());
    sgs.replace_parts(vec![(ids[2], bossa)]).unwrap();

    assert_eq!(sgs.part_at(16).unwrap().rhythm().name, "Bossa");
    assert_contiguous(&sgs);

    // Atomic undo of the whole substitution
    sgs.undo().unwrap();
    assert_eq!(sgs.part_at(16).unwrap().rhythm().name, "MediumSwing");
    assert_eq!(sgs.part_at(16).unwrap().id(), ids[2]);
    assert_contiguous(&sgs);
}

#[test]
fn test_parts_mirror_lead_sheet_sections() {
    // Build the arrangement from a lead sheet's section regions, the
    // way a song aggregate would
    let mut cls = leadsheet::LeadSheet::new(16, TimeSignature::four_four()).unwrap();
    cls.add_section(Section::new("B", TimeSignature::four_four()), 8)
        .unwrap();

    let mut sgs = SongStructure::new();
    let mut new_parts = Vec::new();
    for item in cls.items(Some(leadsheet::ItemKind::Section)) {
        let section = item.data().as_section().unwrap().clone();
        let region = cls.section_region(item.id()).unwrap();
        new_parts.push(NewPart {
            start_bar: region.start,
            nb_bars: region.len(),
            rhythm: Rhythm::new("MediumSwing", section.time_signature),
            parent_section: section,
        });
    }
    sgs.add_parts(new_parts).unwrap();

    assert_eq!(sgs.size_in_bars(), cls.size_in_bars());
    assert_eq!(sgs.parts().len(), 2);
    assert_eq!(sgs.part_at(8).unwrap().name(), "B");
    assert_contiguous(&sgs);
}

#[test]
fn test_zero_length_part_rejected() {
    let mut sgs = SongStructure::new();
    let err = sgs
        .add_parts(vec![part(0, 0, "A", "MediumSwing")])
        .unwrap_err();
    assert_eq!(err, EditError::Unsupported(UnsupportedEdit::ZeroLengthPart));
    assert_eq!(sgs.parts().len(), 0);
}

#[test]
fn test_action_brackets_fire_once_per_operation() {
    let (mut sgs, ids) = aaba();
    let actions = Rc::new(RefCell::new(Vec::new()));
    let sink = actions.clone();
    sgs.subscribe(move |event| {
        if let SongStructureEvent::Action(action) = event {
            sink.borrow_mut().push(action.clone());
        }
    });

    sgs.resize_parts(&[(ids[0], 10), (ids[3], 4)]).unwrap();

    let actions = actions.borrow();
    assert_eq!(actions.len(), 2);
    assert_eq!(actions[0].action(), "resizeParts");
    assert!(matches!(actions[0], ActionEvent::Started { .. }));
    assert!(matches!(
        actions[1],
        ActionEvent::Completed {
            rolled_back: false,
            ..
        }
    ));
    assert_eq!(actions[0].id(), actions[1].id());
}

#[test]
fn test_failed_removal_reports_unknown_part() {
    let (mut sgs, _) = aaba();
    let err = sgs.remove_parts(&[999]).unwrap_err();
    assert!(err.is_precondition());
    assert_eq!(sgs.parts().len(), 4);
}

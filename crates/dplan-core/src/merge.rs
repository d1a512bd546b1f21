use std::collections::HashMap;

use tracing::debug;

use crate::course_key::CourseKey;
use crate::model::{CourseEntry, ResolvedCourseSet, Transcript};
use crate::placeholder::ElectivePlaceholder;
use crate::resolver::ResolvedBatch;

/// Folds resolved batches into one course set.
///
/// Placeholder ordinals are reassigned from a running counter per category
/// label (case-insensitive), in first-seen order. A mention is identified by
/// its section, option, label and local ordinal, so folding the same batch
/// twice maps onto the same slots while sibling options get slots of their own.
#[derive(Debug)]
pub struct CourseSetMerger<'a> {
    transcript: &'a Transcript,
    set: ResolvedCourseSet,
    labels: HashMap<String, LabelSlots>,
}

#[derive(Debug, Default)]
struct LabelSlots {
    display: String,
    next: u32,
    assigned: HashMap<(usize, usize, u32), u32>,
}

impl<'a> CourseSetMerger<'a> {
    pub fn new(transcript: &'a Transcript) -> Self {
        Self {
            transcript,
            set: ResolvedCourseSet::new(),
            labels: HashMap::new(),
        }
    }

    /// Returns how many new entries were added.
    pub fn merge_batch(&mut self, batch: &ResolvedBatch) -> usize {
        let mut added = self.add_courses(batch.courses.iter().cloned());

        for mention in &batch.placeholders {
            let local = mention.ordinal.unwrap_or(1);
            let slots = self
                .labels
                .entry(mention.label.to_lowercase())
                .or_insert_with(|| LabelSlots {
                    display: mention.label.clone(),
                    ..LabelSlots::default()
                });
            let next = &mut slots.next;
            let global = *slots
                .assigned
                .entry((batch.source, batch.option_index, local))
                .or_insert_with(|| {
                    *next += 1;
                    *next
                });
            let placeholder = ElectivePlaceholder::new(&slots.display, global);
            if self.set.insert(CourseEntry::Elective(placeholder)) {
                added += 1;
            }
        }

        debug!(source = batch.source, added, total = self.set.len(), "Merged batch");
        added
    }

    /// Union concrete courses, skipping anything on the transcript.
    pub fn add_courses(&mut self, courses: impl IntoIterator<Item = CourseKey>) -> usize {
        let mut added = 0;
        for key in courses {
            if self.transcript.contains(&key) {
                debug!(course = %key, "Skipping completed course");
                continue;
            }
            if self.set.insert(CourseEntry::Course(key)) {
                added += 1;
            }
        }
        added
    }

    pub fn set(&self) -> &ResolvedCourseSet {
        &self.set
    }

    pub fn finish(self) -> ResolvedCourseSet {
        self.set
    }
}

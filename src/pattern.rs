//! Query pattern representation and its monophonic/polyphonic derived views.

use serde::{Deserialize, Serialize};

use crate::{Error, Result, MAX_BITPARALLEL_PATTERN, MAX_PATTERN_NOTES, PNOTERESOLUTION};

/// One note of a pattern, in canonical 960-units-per-quarter-note onset resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub onset: u32,
    pub pitch: i8,
    pub duration: u16,
}

/// A short query: an ordered sequence of notes, at most [`MAX_PATTERN_NOTES`] long.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    pub notes: Vec<Note>,
}

impl Pattern {
    pub fn new(notes: Vec<Note>) -> Self {
        Self { notes }
    }

    /// Rejects patterns over [`MAX_PATTERN_NOTES`]. Kernels call this once at
    /// init time; per-song size mismatches (pattern longer than the song) are
    /// instead handled by each kernel's scan phase returning an empty list.
    pub fn validate(&self) -> Result<()> {
        if self.notes.len() > MAX_PATTERN_NOTES {
            return Err(Error::OversizedPattern(self.notes.len()));
        }
        Ok(())
    }

    /// Same as [`Self::validate`], plus the bit-parallel word-width cap used
    /// by ShiftOrAnd, MonoPoly and IntervalMatching.
    pub fn validate_bitparallel(&self) -> Result<()> {
        self.validate()?;
        if self.notes.len() > MAX_BITPARALLEL_PATTERN {
            return Err(Error::OversizedBitParallelPattern(self.notes.len()));
        }
        Ok(())
    }

    /// One note per distinct onset, keeping the lowest pitch. Used by the
    /// interval-only filters (ShiftOrAnd, MonoPoly, IntervalMatching, LCTS).
    pub fn monophonic(&self) -> Vec<Note> {
        let mut sorted = self.notes.clone();
        sorted.sort_by(|a, b| a.onset.cmp(&b.onset).then(a.pitch.cmp(&b.pitch)));

        let mut mono: Vec<Note> = Vec::with_capacity(sorted.len());
        for note in sorted {
            if mono.last().map(|p| p.onset) != Some(note.onset) {
                mono.push(note);
            }
        }
        mono
    }

    /// All notes, sorted ascending by (onset, pitch). Used by checkers and
    /// the geometric kernels.
    pub fn polyphonic(&self) -> Vec<Note> {
        let mut sorted = self.notes.clone();
        sorted.sort_by(|a, b| a.onset.cmp(&b.onset).then(a.pitch.cmp(&b.pitch)));
        sorted
    }

    /// Rescale a canonical-resolution (960 ppq) onset to `quarter_note_duration` ppq.
    pub fn rescale_onset(onset: u32, quarter_note_duration: u32) -> u32 {
        onset * quarter_note_duration / PNOTERESOLUTION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(onset: u32, pitch: i8) -> Note {
        Note {
            onset,
            pitch,
            duration: 480,
        }
    }

    #[test]
    fn monophonic_keeps_lowest_pitch_per_onset() {
        let p = Pattern::new(vec![n(0, 64), n(0, 60), n(480, 67)]);
        let mono = p.monophonic();
        assert_eq!(mono.len(), 2);
        assert_eq!(mono[0].pitch, 60);
        assert_eq!(mono[1].pitch, 67);
    }

    #[test]
    fn polyphonic_keeps_all_notes_sorted() {
        let p = Pattern::new(vec![n(480, 67), n(0, 64), n(0, 60)]);
        let poly = p.polyphonic();
        assert_eq!(poly.len(), 3);
        assert_eq!(poly[0].pitch, 60);
        assert_eq!(poly[1].pitch, 64);
        assert_eq!(poly[2].pitch, 67);
    }

    #[test]
    fn oversized_pattern_rejected() {
        let notes: Vec<Note> = (0..41).map(|i| n(i * 10, 60)).collect();
        let p = Pattern::new(notes);
        assert!(matches!(p.validate(), Err(Error::OversizedPattern(41))));
    }

    #[test]
    fn bitparallel_cap_rejected_above_32() {
        let notes: Vec<Note> = (0..33).map(|i| n(i * 10, 60)).collect();
        let p = Pattern::new(notes);
        assert!(p.validate().is_ok());
        assert!(matches!(
            p.validate_bitparallel(),
            Err(Error::OversizedBitParallelPattern(33))
        ));
    }
}

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Smallest number that can be drawn.
pub const MIN_NUMBER: u8 = 1;
/// Largest number that can be drawn.
pub const MAX_NUMBER: u8 = 45;
/// Main numbers per draw (the bonus ball is separate).
pub const PICK_COUNT: usize = 6;

/// One lottery draw as stored in the draw store and served by the API.
///
/// Only `DrawRecord::new` builds a real record, so `numbers` always holds
/// six distinct values in `1..=45`, ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DrawInput")]
pub struct DrawRecord {
    pub draw_no: u32,
    pub numbers: [u8; PICK_COUNT],
    pub bonus: Option<u8>,
    /// Draw date as reported upstream, e.g. "2024-06-01"
    pub date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DrawError {
    #[error("draw_no must be a positive integer")]
    ZeroDrawNo,
    #[error("number {0} is outside 1..=45")]
    OutOfRange(i64),
    #[error("numbers must be 6 unique integers between 1 and 45 (got {0} unique)")]
    WrongCount(usize),
}

impl DrawRecord {
    /// Validate and normalise a draw: numbers are deduplicated and sorted,
    /// an out-of-range bonus becomes `None`, and a blank date becomes `None`.
    pub fn new(
        draw_no: u32,
        numbers: impl IntoIterator<Item = i64>,
        bonus: Option<i64>,
        date: Option<String>,
    ) -> Result<Self, DrawError> {
        if draw_no == 0 {
            return Err(DrawError::ZeroDrawNo);
        }

        let mut picked: Vec<u8> = Vec::with_capacity(PICK_COUNT);
        for n in numbers {
            if !is_valid_number(n) {
                return Err(DrawError::OutOfRange(n));
            }
            picked.push(n as u8);
        }
        picked.sort_unstable();
        picked.dedup();

        let numbers: [u8; PICK_COUNT] = picked
            .as_slice()
            .try_into()
            .map_err(|_| DrawError::WrongCount(picked.len()))?;

        let bonus = bonus.filter(|b| is_valid_number(*b)).map(|b| b as u8);
        let date = date
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        Ok(DrawRecord {
            draw_no,
            numbers,
            bonus,
            date,
        })
    }

    /// Stand-in served by `/api/latest` when nothing is known yet.
    /// Never written to the store.
    pub fn placeholder() -> Self {
        DrawRecord {
            draw_no: 0,
            numbers: [1, 2, 3, 4, 5, 6],
            bonus: Some(7),
            date: None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.draw_no == 0
    }
}

fn is_valid_number(n: i64) -> bool {
    (i64::from(MIN_NUMBER)..=i64::from(MAX_NUMBER)).contains(&n)
}

/// Unvalidated draw as it arrives from a client or from the JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct DrawInput {
    pub draw_no: u32,
    pub numbers: Vec<i64>,
    #[serde(default)]
    pub bonus: Option<i64>,
    #[serde(default)]
    pub date: Option<String>,
}

impl TryFrom<DrawInput> for DrawRecord {
    type Error = DrawError;

    fn try_from(input: DrawInput) -> Result<Self, Self::Error> {
        DrawRecord::new(input.draw_no, input.numbers, input.bonus, input.date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sorts_and_keeps_six() {
        let d = DrawRecord::new(1120, [45, 3, 17, 9, 1, 30], Some(12), Some("2024-05-25".into()))
            .unwrap();
        assert_eq!(d.numbers, [1, 3, 9, 17, 30, 45]);
        assert_eq!(d.bonus, Some(12));
        assert_eq!(d.date.as_deref(), Some("2024-05-25"));
    }

    #[test]
    fn test_new_rejects_duplicates_that_leave_five() {
        let err = DrawRecord::new(5, [1, 1, 2, 3, 4, 5], None, None).unwrap_err();
        assert_eq!(err, DrawError::WrongCount(5));
    }

    #[test]
    fn test_new_rejects_out_of_range() {
        assert_eq!(
            DrawRecord::new(5, [0, 1, 2, 3, 4, 5], None, None).unwrap_err(),
            DrawError::OutOfRange(0)
        );
        assert_eq!(
            DrawRecord::new(5, [1, 2, 3, 4, 5, 46], None, None).unwrap_err(),
            DrawError::OutOfRange(46)
        );
    }

    #[test]
    fn test_new_rejects_seven_numbers_and_zero_draw() {
        assert_eq!(
            DrawRecord::new(5, [1, 2, 3, 4, 5, 6, 7], None, None).unwrap_err(),
            DrawError::WrongCount(7)
        );
        assert_eq!(
            DrawRecord::new(0, [1, 2, 3, 4, 5, 6], None, None).unwrap_err(),
            DrawError::ZeroDrawNo
        );
    }

    #[test]
    fn test_bad_bonus_and_blank_date_become_none() {
        let d = DrawRecord::new(9, [1, 2, 3, 4, 5, 6], Some(0), Some("  ".into())).unwrap();
        assert_eq!(d.bonus, None);
        assert_eq!(d.date, None);
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: DrawRecord =
            serde_json::from_str(r#"{"draw_no":3,"numbers":[6,5,4,3,2,1],"bonus":7}"#).unwrap();
        assert_eq!(ok.numbers, [1, 2, 3, 4, 5, 6]);

        let bad = serde_json::from_str::<DrawRecord>(r#"{"draw_no":3,"numbers":[1,2,3]}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_placeholder_is_flagged() {
        assert!(DrawRecord::placeholder().is_placeholder());
        assert!(!DrawRecord::new(1, [1, 2, 3, 4, 5, 6], None, None)
            .unwrap()
            .is_placeholder());
    }
}

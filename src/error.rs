use crate::record::DocumentClass;

#[derive(thiserror::Error, Debug)]
pub enum IssueError {
    #[error("booking {0} is cancelled; letters can no longer be issued or amended")]
    BlockedByCancellation(String),
    #[error("invalid letter date {0:?}; expected YYYY-MM-DD")]
    InvalidLetterDate(String),
    #[error("sequence conflict for booking {booking_id} class {class} after {attempts} attempts")]
    SequenceConflict {
        booking_id: String,
        class: DocumentClass,
        attempts: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_conflict_names_the_contested_class() {
        let baseline_race = IssueError::SequenceConflict {
            booking_id: "bkg_1".into(),
            class: DocumentClass::Placement,
            attempts: 5,
        };
        assert!(baseline_race.to_string().contains("class PLACEMENT "));

        let amendment_race = IssueError::SequenceConflict {
            booking_id: "bkg_1".into(),
            class: DocumentClass::PlacementMod,
            attempts: 5,
        };
        assert!(amendment_race.to_string().contains("class PLACEMENT_MOD"));
    }
}

// Edit applicator: parses and applies "col,row,value" changes to a table.
// Every change is handled on its own; a failure is recorded in the report and
// the batch carries on with the next change.
use crate::change::Change;
use crate::error::ChangeError;
use crate::model::{Cell, Table};

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeOutcome {
    pub raw: String,
    pub result: Result<Change, ChangeError>,
}

impl ChangeOutcome {
    pub fn is_applied(&self) -> bool {
        self.result.is_ok()
    }
}

/// Results of one batch, in the order the changes were given.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditReport {
    pub outcomes: Vec<ChangeOutcome>,
}

impl EditReport {
    pub fn applied(&self) -> impl Iterator<Item = &Change> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    /// Raw change text and reason for each change that was skipped.
    pub fn skipped(&self) -> impl Iterator<Item = (&str, &ChangeError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.raw.as_str(), e)))
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped().count()
    }
}

fn apply_one(table: &mut Table, raw: &str) -> Result<Change, ChangeError> {
    let change: Change = raw.parse()?;
    table.set_cell(change.row, change.col, Cell::Text(change.value.clone()))?;
    Ok(change)
}

pub fn apply_changes<S: AsRef<str>>(table: &mut Table, changes: &[S]) -> EditReport {
    let mut report = EditReport::default();
    for raw in changes {
        let raw = raw.as_ref();
        let result = apply_one(table, raw);
        match &result {
            Ok(c) => log::debug!("applied change '{}' at row {}, column {}", raw, c.row, c.col),
            Err(e) => log::info!("skipping change '{}': {}", raw, e),
        }
        report.outcomes.push(ChangeOutcome {
            raw: raw.to_string(),
            result,
        });
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn grid() -> Table {
        Table::from_text_rows([["a", "b"], ["c", "d"]])
    }

    #[test]
    fn applies_in_order_later_wins() {
        let mut t = Table::from_text_rows([["x"]]);
        let report = apply_changes(&mut t, &["0,0,A", "0,0,B"]);
        assert_eq!(report.applied().count(), 2);
        assert_eq!(t.cell(0, 0), Some(&Cell::text("B")));
    }

    #[test]
    fn same_change_twice_is_idempotent() {
        let mut once = grid();
        let mut twice = grid();
        apply_changes(&mut once, &["1,0,Q"]);
        apply_changes(&mut twice, &["1,0,Q", "1,0,Q"]);
        assert_eq!(once, twice);
    }

    #[test]
    fn out_of_range_is_skipped_and_table_untouched() {
        let mut t = grid();
        let report = apply_changes(&mut t, &["0,5,X"]);
        assert_eq!(t, grid());
        let skipped: Vec<_> = report.skipped().collect();
        assert_eq!(skipped, vec![("0,5,X", &ChangeError::RowOutOfRange(5))]);
    }

    #[test]
    fn failures_do_not_discard_other_changes() {
        let mut t = grid();
        let report = apply_changes(&mut t, &["1,2", "0,1,Z", "x,0,v", "7,0,v", "1,1,W"]);
        assert_eq!(report.outcomes.len(), 5);
        assert_eq!(report.skipped_count(), 3);
        assert_eq!(t, Table::from_text_rows([["a", "b"], ["Z", "W"]]));
        assert!(!report.outcomes[0].is_applied());
        assert!(report.outcomes[1].is_applied());
        assert_eq!(
            report.outcomes[3].result,
            Err(ChangeError::ColumnOutOfRange(7))
        );
    }

    #[test]
    fn replacement_is_always_text() {
        let mut t = Table::new(vec![Cell::List(vec![Cell::Int(1), Cell::Bool(false)])]);
        apply_changes(&mut t, &["0,0,2", "1,0,true"]);
        assert_eq!(
            t.rows()[0],
            Cell::List(vec![Cell::text("2"), Cell::text("true")])
        );
    }
}

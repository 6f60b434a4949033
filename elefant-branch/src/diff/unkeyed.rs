use crate::diff::{DbDiff, Diff, DiffInputs, Row};
use crate::Result;

#[derive(Clone, Copy)]
enum Delta {
    APlus,
    AMinus,
    BPlus,
    BMinus,
}

impl Delta {
    fn relation(self, inputs: &DiffInputs) -> &str {
        match self {
            Delta::APlus => &inputs.a_plus,
            Delta::AMinus => &inputs.a_minus,
            Delta::BPlus => &inputs.b_plus,
            Delta::BMinus => &inputs.b_minus,
        }
    }
}

/// A class of changed rows, and the sequences its rows show up in.
struct Partition {
    left: Delta,
    operation: &'static str,
    right: Delta,
    control: bool,
    baseline: bool,
    experimental: bool,
}

/// The partitions, in the order they appear in the diff.
const PARTITIONS: [Partition; 6] = [
    // Added by the first branch only.
    Partition { left: Delta::APlus, operation: "except all", right: Delta::BPlus, control: true, baseline: false, experimental: false },
    // Added by both.
    Partition { left: Delta::APlus, operation: "intersect all", right: Delta::BPlus, control: true, baseline: false, experimental: true },
    // Added by the second branch only.
    Partition { left: Delta::BPlus, operation: "except all", right: Delta::APlus, control: false, baseline: false, experimental: true },
    // Removed by the first branch only, the second still has it.
    Partition { left: Delta::AMinus, operation: "except all", right: Delta::BMinus, control: false, baseline: true, experimental: true },
    // Removed by the second branch only, the first still has it.
    Partition { left: Delta::BMinus, operation: "except all", right: Delta::AMinus, control: true, baseline: true, experimental: false },
    // Removed by both.
    Partition { left: Delta::AMinus, operation: "intersect all", right: Delta::BMinus, control: false, baseline: true, experimental: false },
];

/// Diffs a table whose rows can only be compared as a whole.
///
/// Every changed row lands in exactly one partition, and is shown in the sequences that
/// contain it, with nil rows in the others.
pub(super) async fn diff_unkeyed(engine: &DbDiff<'_>, inputs: &DiffInputs, mut diff: Diff) -> Result<Diff> {
    let column_list = inputs.columns.join(", ");
    let width = diff.width();

    for partition in &PARTITIONS {
        let sql = format!(
            "select {column_list} from {} {} select {column_list} from {} order by {column_list};",
            partition.left.relation(inputs),
            partition.operation,
            partition.right.relation(inputs),
        );

        for row in engine.read_rows(&sql, width).await? {
            let slot = |present: bool| if present { row.clone() } else { Row::nil(width) };
            diff.control.push(slot(partition.control));
            diff.baseline.push(slot(partition.baseline));
            diff.experimental.push(slot(partition.experimental));
        }
    }

    Ok(diff)
}

use itertools::Itertools;
use crate::diff::scratch::ScratchViews;
use crate::diff::{DbDiff, Diff, DiffInputs};
use crate::quoting::{AttemptedKeywordUsage, QuotableIter};
use crate::{ElefantBranchError, Result};

/// Diffs a table with a key, giving exactly one aligned entry per key either branch touched.
pub(super) async fn diff_keyed(
    engine: &DbDiff<'_>,
    scratch: &mut ScratchViews<'_>,
    inputs: &DiffInputs,
    key_columns: &[String],
    mut diff: Diff,
    table_name: &str,
) -> Result<Diff> {
    let keys = key_columns
        .iter()
        .quote(engine.quoter, AttemptedKeywordUsage::ColumnName)
        .collect_vec();
    let key_list = keys.join(", ");
    let column_list = inputs.columns.join(", ");

    let key_query = format!(
        "select distinct {key_list} from ({}) touched",
        [&inputs.a_plus, &inputs.a_minus, &inputs.b_plus, &inputs.b_minus]
            .iter()
            .map(|relation| format!("select {key_list} from {relation}"))
            .join(" union all ")
    );
    let key_view = scratch.create(engine.connection, "keys", &key_query).await?;

    let control = format!(
        "select {column_list} from {} union all (select {column_list} from {} except all select {column_list} from {})",
        inputs.a_plus, inputs.b_minus, inputs.a_minus
    );
    let baseline = format!(
        "select {column_list} from {} union select {column_list} from {}",
        inputs.a_minus, inputs.b_minus
    );
    let experimental = format!(
        "select {column_list} from {} union all (select {column_list} from {} except all select {column_list} from {})",
        inputs.b_plus, inputs.a_minus, inputs.b_minus
    );

    let width = diff.width();
    let aligned = |side: &str| {
        format!(
            "select {} from {key_view} k left join ({side}) s on ({}) = ({}) order by {};",
            inputs.columns.iter().map(|c| format!("s.{c}")).join(", "),
            keys.iter().map(|c| format!("k.{c}")).join(", "),
            keys.iter().map(|c| format!("s.{c}")).join(", "),
            keys.iter().map(|c| format!("k.{c}")).join(", "),
        )
    };

    diff.control = engine.read_rows(&aligned(&control), width).await?;
    diff.baseline = engine.read_rows(&aligned(&baseline), width).await?;
    diff.experimental = engine.read_rows(&aligned(&experimental), width).await?;

    if diff.control.len() != diff.baseline.len() || diff.baseline.len() != diff.experimental.len() {
        return Err(ElefantBranchError::DiffLengthMismatch {
            table: table_name.to_string(),
            control: diff.control.len(),
            baseline: diff.baseline.len(),
            experimental: diff.experimental.len(),
        });
    }

    Ok(diff)
}

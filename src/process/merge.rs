use super::Dataset;

/// Concatenate datasets in the order given, keeping each one's row order.
///
/// Headers are unioned in first-seen order; rows keep only the keys they
/// were read with, so cells for columns they lack serialize empty. No
/// deduplication is done.
pub fn merge_datasets<I>(datasets: I) -> Dataset
where
    I: IntoIterator<Item = Dataset>,
{
    let mut columns: Vec<String> = Vec::new();
    let mut rows = Vec::new();

    for dataset in datasets {
        let (cols, mut more) = dataset.into_parts();
        for col in cols {
            if !columns.contains(&col) {
                columns.push(col);
            }
        }
        rows.append(&mut more);
    }

    Dataset::with_columns(columns, rows)
}

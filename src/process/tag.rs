use super::Dataset;

pub const STATUS_COLUMN: &str = "status";

/// Set `status` to `label` on every row. Other keys are left as they are;
/// a row that already has a `status` is overwritten.
pub fn tag_status(dataset: Dataset, label: &str) -> Dataset {
    let (mut columns, rows) = dataset.into_parts();
    if !columns.iter().any(|c| c == STATUS_COLUMN) {
        columns.push(STATUS_COLUMN.to_string());
    }

    let rows = rows
        .into_iter()
        .map(|mut row| {
            row.insert(STATUS_COLUMN, label);
            row
        })
        .collect();

    Dataset::with_columns(columns, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::Row;

    fn sample() -> Dataset {
        Dataset::with_columns(
            vec!["nome".into(), "valor".into()],
            vec![
                vec![("nome", "Ana"), ("valor", "10")].into_iter().collect(),
                vec![("nome", "Bia"), ("valor", "20")].into_iter().collect(),
            ],
        )
    }

    #[test]
    fn test_every_row_gets_label() {
        let before = sample();
        let after = tag_status(before.clone(), "terminados");

        assert_eq!(after.len(), before.len());
        assert_eq!(after.columns(), &["nome", "valor", "status"]);
        for (old, new) in before.rows().iter().zip(after.rows()) {
            assert_eq!(new.get(STATUS_COLUMN), Some("terminados"));
            assert_eq!(new.len(), old.len() + 1);
            for (k, v) in old.iter() {
                assert_eq!(new.get(k), Some(v));
            }
        }
    }

    #[test]
    fn test_existing_status_overwritten() {
        let row: Row = vec![("status", "ativo"), ("nome", "Ana")].into_iter().collect();
        let ds = Dataset::with_columns(vec!["status".into(), "nome".into()], vec![row]);

        let tagged = tag_status(ds, "pendente");
        assert_eq!(tagged.columns(), &["status", "nome"]);
        let row = &tagged.rows()[0];
        assert_eq!(row.get("status"), Some("pendente"));
        assert_eq!(row.keys().collect::<Vec<_>>(), vec!["status", "nome"]);
    }

    #[test]
    fn test_empty_dataset_keeps_header() {
        let ds = Dataset::with_columns(vec!["nome".into()], Vec::new());
        let tagged = tag_status(ds, "ativos");
        assert!(tagged.is_empty());
        assert_eq!(tagged.columns(), &["nome", "status"]);
    }
}

use anyhow::{bail, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::warn;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

use super::{Dataset, Row};

static NON_SLUG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_]").expect("slug pattern should compile"));
static UNDERSCORE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_{2,}").expect("underscore pattern should compile"));

/// What to do when two distinct headers normalize to the same key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Keep both columns; the later one gets `_2`, `_3`, ... appended.
    #[default]
    Suffix,
    /// Fail the operation.
    Reject,
}

/// Slug a single column name: strip diacritics, map anything outside
/// `[A-Za-z0-9_]` to `_`, collapse and trim underscores, lowercase.
///
/// May return an empty string when the input has no alphanumerics.
pub fn normalize_key(raw: &str) -> String {
    let stripped: String = raw.nfd().filter(|c| !is_combining_mark(*c)).collect();
    let slug = NON_SLUG.replace_all(&stripped, "_");
    let slug = UNDERSCORE_RUN.replace_all(&slug, "_");
    slug.trim_matches('_').to_ascii_lowercase()
}

/// Normalize a whole header, guaranteeing non-empty, unique keys.
///
/// Keys that slug to nothing become `column_<n>` (1-based position).
pub fn normalize_columns<S: AsRef<str>>(
    columns: &[S],
    policy: CollisionPolicy,
) -> Result<Vec<String>> {
    // normalized key -> original header that claimed it
    let mut claimed: HashMap<String, &str> = HashMap::with_capacity(columns.len());
    let mut out = Vec::with_capacity(columns.len());

    for (idx, original) in columns.iter().map(AsRef::as_ref).enumerate() {
        let mut key = normalize_key(original);
        if key.is_empty() {
            key = format!("column_{}", idx + 1);
        }

        if let Some(first) = claimed.get(key.as_str()) {
            match policy {
                CollisionPolicy::Reject => bail!(
                    "columns {:?} and {:?} both normalize to `{}`",
                    first,
                    original,
                    key
                ),
                CollisionPolicy::Suffix => {
                    let base = key.clone();
                    let mut n = 2;
                    while claimed.contains_key(&key) || columns_contain_later(columns, idx, &key) {
                        key = format!("{}_{}", base, n);
                        n += 1;
                    }
                    warn!(
                        first = %first,
                        column = %original,
                        normalized = %base,
                        renamed = %key,
                        "column name collision after normalization"
                    );
                }
            }
        }

        claimed.insert(key.clone(), original);
        out.push(key);
    }

    Ok(out)
}

/// True when a header after `idx` already normalizes to `key`, so a suffix
/// must not steal it.
fn columns_contain_later<S: AsRef<str>>(columns: &[S], idx: usize, key: &str) -> bool {
    columns[idx + 1..]
        .iter()
        .any(|c| normalize_key(c.as_ref()) == key)
}

/// Rename the keys of a single row. Values are untouched.
pub fn normalize_row(row: &Row, policy: CollisionPolicy) -> Result<Row> {
    let keys: Vec<&str> = row.keys().collect();
    let renamed = normalize_columns(&keys, policy)?;
    Ok(renamed
        .into_iter()
        .zip(row.iter().map(|(_, v)| v.to_string()))
        .collect())
}

/// Rename every key in the dataset using one mapping derived from its header,
/// so rows of the same dataset agree on their normalized names.
pub fn normalize_dataset(dataset: Dataset, policy: CollisionPolicy) -> Result<Dataset> {
    let header = dataset.header();
    let renamed = normalize_columns(&header, policy)?;
    let mapping: HashMap<&str, &str> = header
        .iter()
        .map(String::as_str)
        .zip(renamed.iter().map(String::as_str))
        .collect();

    let rows = dataset
        .into_rows()
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|(k, v)| {
                    let key = mapping.get(k.as_str()).map(|s| s.to_string()).unwrap_or(k);
                    (key, v)
                })
                .collect::<Row>()
        })
        .collect();

    Ok(Dataset::with_columns(renamed, rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_slug(key: &str) -> bool {
        !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
            && !key.starts_with('_')
            && !key.ends_with('_')
            && !key.contains("__")
    }

    #[test]
    fn test_accents_and_punctuation() {
        assert_eq!(normalize_key("Nome Completo"), "nome_completo");
        assert_eq!(normalize_key("Status (Atual)"), "status_atual");
        assert_eq!(normalize_key("Situação"), "situacao");
        assert_eq!(normalize_key("  Valor  R$ / mês "), "valor_r_mes");
        assert_eq!(normalize_key("__Já__Pago__"), "ja_pago");
        assert_eq!(normalize_key("Nº Contrato"), "n_contrato");
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "Nome Completo",
            "Status (Atual)",
            "Código do Imóvel",
            "data-vencimento",
            "ÀÉÎÕÜ çñ",
            "already_clean_1",
        ];
        for input in inputs {
            let once = normalize_key(input);
            assert_eq!(normalize_key(&once), once, "input {:?}", input);
            assert!(is_slug(&once), "{:?} -> {:?}", input, once);
        }
    }

    #[test]
    fn test_no_alphanumerics_yields_positional_name() -> Result<()> {
        assert_eq!(normalize_key("???"), "");
        let cols = normalize_columns(&["Nome", "???", ""], CollisionPolicy::Suffix)?;
        assert_eq!(cols, vec!["nome", "column_2", "column_3"]);
        Ok(())
    }

    #[test]
    fn test_collision_suffix() -> Result<()> {
        let cols = normalize_columns(&["Status", "status ", "STATUS!"], CollisionPolicy::Suffix)?;
        assert_eq!(cols, vec!["status", "status_2", "status_3"]);
        Ok(())
    }

    #[test]
    fn test_collision_suffix_skips_later_header() -> Result<()> {
        let cols = normalize_columns(&["Status", "status", "Status 2"], CollisionPolicy::Suffix)?;
        assert_eq!(cols, vec!["status", "status_3", "status_2"]);
        Ok(())
    }

    #[test]
    fn test_collision_reject() {
        let err = normalize_columns(&["Status", "status "], CollisionPolicy::Reject)
            .unwrap_err()
            .to_string();
        assert!(err.contains("`status`"), "{}", err);
    }

    #[test]
    fn test_normalize_columns_idempotent() -> Result<()> {
        let once = normalize_columns(
            &["Valor", "valor", "Valor (R$)", "", "Ação"],
            CollisionPolicy::Suffix,
        )?;
        let twice = normalize_columns(&once, CollisionPolicy::Suffix)?;
        assert_eq!(once, twice);
        Ok(())
    }

    #[test]
    fn test_normalize_dataset_renames_consistently() -> Result<()> {
        let ds = Dataset::with_columns(
            vec!["Nome".into(), "Situação".into()],
            vec![
                vec![("Nome", "Ana"), ("Situação", "ok")].into_iter().collect(),
                vec![("Nome", "Bia"), ("Extra Col", "x")].into_iter().collect(),
            ],
        );
        let out = normalize_dataset(ds, CollisionPolicy::Suffix)?;

        assert_eq!(out.columns(), &["nome", "situacao", "extra_col"]);
        assert_eq!(out.rows()[0].get("situacao"), Some("ok"));
        assert_eq!(out.rows()[1].get("extra_col"), Some("x"));
        assert_eq!(out.rows()[1].get("situacao"), None);
        Ok(())
    }

    #[test]
    fn test_normalize_row_keeps_values() -> Result<()> {
        let row: Row = vec![
            ("Nome Completo".to_string(), "João Silva".to_string()),
            ("Status (Atual)".to_string(), " ativo ".to_string()),
        ]
        .into_iter()
        .collect();
        let out = normalize_row(&row, CollisionPolicy::Suffix)?;
        assert_eq!(out.get("nome_completo"), Some("João Silva"));
        assert_eq!(out.get("status_atual"), Some(" ativo "));
        assert_eq!(out.len(), 2);
        Ok(())
    }
}

//! The column template engine: turns joined rows into the final table.

use std::collections::BTreeMap;

use common::model::template::{ColumnKind, TemplateDocument};
use log::warn;

use crate::error::Result;
use crate::mapping::join::JoinedRow;
use crate::template::{document, expr};

/// A rendered output table. Column order matches the template's
/// `column_order`; the row count always matches the input row count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Render the joined rows through a template document.
///
/// The document is validated once, up front. Per cell: `source` columns copy
/// the named row column and fall back to the default when absent or empty,
/// `computed` columns evaluate their expression and fall back to the default
/// when it fails (logged, never fatal), `constant` columns emit their value
/// unconditionally.
pub fn render(rows: &[JoinedRow], template: &TemplateDocument) -> Result<Table> {
    document::validate(template, None)?;

    // Computed expressions parse once per column, not once per row.
    let mut programs: BTreeMap<&str, expr::Expr> = BTreeMap::new();
    for (name, definition) in &template.column_definitions {
        if definition.kind != ColumnKind::Computed {
            continue;
        }
        if let Some(expression) = definition.expression.as_deref() {
            match expr::parse(expression) {
                Ok(program) => {
                    programs.insert(name.as_str(), program);
                }
                Err(err) => {
                    // Validation already rejected these; a stale document
                    // degrades to the column default instead of aborting.
                    warn!("column '{}' has an unusable expression: {}", name, err);
                }
            }
        }
    }

    let mut out_rows = Vec::with_capacity(rows.len());
    for row in rows {
        let mut out = Vec::with_capacity(template.column_order.len());
        for name in &template.column_order {
            let definition = &template.column_definitions[name];
            let default = definition.default_value.clone().unwrap_or_default();
            let value = match definition.kind {
                ColumnKind::Source => {
                    let source = definition.source_column.as_deref().unwrap_or("");
                    match row.columns.get(source) {
                        Some(value) if !value.is_empty() => value.clone(),
                        _ => default,
                    }
                }
                ColumnKind::Computed => match programs.get(name.as_str()) {
                    Some(program) => match expr::evaluate(program, &row.columns) {
                        Ok(value) => value.render(),
                        Err(err) => {
                            warn!("column '{}' failed to evaluate: {}", name, err);
                            default
                        }
                    },
                    None => default,
                },
                ColumnKind::Constant => definition.value.clone().unwrap_or_default(),
            };
            out.push(value);
        }
        out_rows.push(out);
    }

    Ok(Table {
        columns: template.column_order.clone(),
        rows: out_rows,
    })
}

#[cfg(test)]
mod tests {
    use common::model::template::ColumnDefinition;

    use super::*;
    use crate::error::MappingError;

    fn joined(fields: &[(&str, &str)]) -> JoinedRow {
        JoinedRow {
            columns: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            matched: true,
        }
    }

    fn definition(kind: ColumnKind) -> ColumnDefinition {
        ColumnDefinition {
            kind,
            source_column: None,
            expression: None,
            value: None,
            default_value: None,
        }
    }

    fn template(columns: Vec<(&str, ColumnDefinition)>) -> TemplateDocument {
        TemplateDocument {
            template_name: "export".to_string(),
            version: "1".to_string(),
            column_order: columns.iter().map(|(name, _)| name.to_string()).collect(),
            column_definitions: columns
                .into_iter()
                .map(|(name, def)| (name.to_string(), def))
                .collect(),
            source_data: None,
        }
    }

    #[test]
    fn renders_source_computed_and_constant_columns_in_order() {
        let template = template(vec![
            (
                "Plan",
                ColumnDefinition {
                    source_column: Some("plan".to_string()),
                    default_value: Some(String::new()),
                    ..definition(ColumnKind::Source)
                },
            ),
            (
                "Gross",
                ColumnDefinition {
                    expression: Some("{net} * 2".to_string()),
                    default_value: Some("n/a".to_string()),
                    ..definition(ColumnKind::Computed)
                },
            ),
            (
                "Origin",
                ColumnDefinition {
                    value: Some("mapped".to_string()),
                    ..definition(ColumnKind::Constant)
                },
            ),
        ]);

        let rows = [joined(&[("plan", "Gold"), ("net", "10")])];
        let table = render(&rows, &template).expect("render");

        assert_eq!(table.columns, vec!["Plan", "Gross", "Origin"]);
        assert_eq!(table.rows, vec![vec!["Gold", "20", "mapped"]]);
    }

    #[test]
    fn source_columns_fall_back_on_absent_or_empty_values() {
        let template = template(vec![(
            "Plan",
            ColumnDefinition {
                source_column: Some("plan".to_string()),
                default_value: Some("none".to_string()),
                ..definition(ColumnKind::Source)
            },
        )]);

        let rows = [joined(&[("plan", "")]), joined(&[("other", "x")])];
        let table = render(&rows, &template).expect("render");
        assert_eq!(table.rows, vec![vec!["none"], vec!["none"]]);
    }

    #[test]
    fn failing_expressions_degrade_to_the_default_per_row() {
        let template = template(vec![(
            "Total",
            ColumnDefinition {
                expression: Some("{amount} + 1".to_string()),
                default_value: Some("?".to_string()),
                ..definition(ColumnKind::Computed)
            },
        )]);

        let rows = [joined(&[("amount", "41")]), joined(&[("amount", "oops")])];
        let table = render(&rows, &template).expect("render");
        assert_eq!(table.rows, vec![vec!["42"], vec!["?"]]);
    }

    #[test]
    fn row_count_is_always_preserved() {
        let template = template(vec![(
            "C",
            ColumnDefinition {
                value: Some("x".to_string()),
                ..definition(ColumnKind::Constant)
            },
        )]);
        let rows: Vec<JoinedRow> = (0..5).map(|i| joined(&[("n", &i.to_string())])).collect();
        let table = render(&rows, &template).expect("render");
        assert_eq!(table.rows.len(), rows.len());
    }

    #[test]
    fn invalid_documents_fail_before_any_row_renders() {
        let mut template = template(vec![(
            "A",
            ColumnDefinition {
                source_column: Some("a".to_string()),
                ..definition(ColumnKind::Source)
            },
        )]);
        template.column_order.push("Ghost".to_string());

        match render(&[], &template) {
            Err(MappingError::Config(message)) => assert!(message.contains("Ghost")),
            other => panic!("expected Config error, got {:?}", other.map(|_| ())),
        }
    }
}

//! Whole-store validity checks and strictness transitions.

use hashbrown::HashMap;
use tracing::info;

use super::{Issue, IssueKind, Store, Strictness, ValidityReport};
use crate::model::{Record, RecordId, Value};
use crate::{Error, Result};

impl Store {
    /// Check every record against the rules of `level`.
    ///
    /// Read-only. Issues are listed in record creation order, then field
    /// order.
    pub fn validate(&self, level: Strictness) -> ValidityReport {
        let mut issues = Vec::new();
        if level == Strictness::None {
            return ValidityReport { level, issues };
        }

        // lowercased name -> earlier records holding it
        let mut seen: HashMap<String, Vec<RecordId>> = HashMap::new();
        for record in self.graph.iter() {
            self.check_fields(record, level, &mut issues);
            if level < Strictness::Final {
                continue;
            }

            let schema = record.schema();
            if record.len() < schema.min_fields {
                issues.push(Issue {
                    record: record.id(),
                    field: None,
                    kind: IssueKind::BelowMinimumFields { len: record.len(), min: schema.min_fields },
                });
            }
            if let Some(name) = record.name() {
                let earlier = seen.entry(name.trim().to_lowercase()).or_default();
                let clash = earlier.iter().copied().find(|other| {
                    self.graph
                        .get(*other)
                        .is_some_and(|r| r.schema().shares_names_with(schema))
                });
                if let Some(existing) = clash {
                    issues.push(Issue {
                        record: record.id(),
                        field: Some(0),
                        kind: IssueKind::DuplicateName { name: name.to_owned(), existing },
                    });
                }
                earlier.push(record.id());
            }
        }
        ValidityReport { level, issues }
    }

    fn check_fields(&self, record: &Record, level: Strictness, issues: &mut Vec<Issue>) {
        let schema = record.schema();
        let len = record.len().max(schema.base_len());
        for i in 0..len {
            let Some(desc) = schema.field_at(i) else { continue };
            let value = record.fields().get(i).and_then(|f| f.value.as_ref());
            let issue = |kind| Issue { record: record.id(), field: Some(i), kind };

            if desc.is_pointer() {
                match value {
                    Some(Value::Ref(target)) => {
                        let compatible = self
                            .graph
                            .get(*target)
                            .is_some_and(|t| desc.accepts(&t.schema().references));
                        if !compatible {
                            issues.push(issue(IssueKind::IncompatibleTarget { target: *target }));
                        }
                    }
                    Some(_) => issues.push(issue(IssueKind::InvalidValue)),
                    None if desc.required => issues.push(issue(IssueKind::NullRequiredPointer)),
                    None => {}
                }
                continue;
            }

            match value {
                Some(v) if !v.fits(desc.kind) => issues.push(issue(IssueKind::InvalidValue)),
                None if level == Strictness::Final && desc.required && desc.default.is_none() => {
                    issues.push(issue(IssueKind::MissingRequiredField));
                }
                _ => {}
            }
        }
    }

    /// Change the enforcement level.
    ///
    /// Lowering always succeeds. Raising succeeds only when the store
    /// already satisfies the new level; otherwise nothing changes and the
    /// first issue is reported as a schema violation.
    pub fn set_strictness(&mut self, level: Strictness) -> Result<()> {
        let current = self.config.strictness;
        if level > current {
            let report = self.validate(level);
            if let Some(first) = report.issues.first() {
                return Err(Error::SchemaViolation {
                    record: Some(first.record),
                    field: first.field,
                    message: format!(
                        "cannot raise strictness to {level}: {} issue(s), first {:?}",
                        report.issues.len(),
                        first.kind
                    ),
                });
            }
        }
        self.config.strictness = level;
        info!(from = %current, to = %level, "strictness changed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::schema::{Catalog, FieldDescriptor, TypeDescriptor};
    use crate::StoreConfig;

    fn catalog() -> Arc<Catalog> {
        Arc::new(
            Catalog::new()
                .with_type(TypeDescriptor::named("Zone").publishes("ZoneNames"))
                .unwrap()
                .with_type(
                    TypeDescriptor::named("Equipment")
                        .field(FieldDescriptor::pointer("Zone", ["ZoneNames"]).required())
                        .field(FieldDescriptor::integer("Count").required()),
                )
                .unwrap(),
        )
    }

    #[test]
    fn test_none_level_has_no_issues() {
        let mut store = Store::with_config(catalog(), StoreConfig::default().with_strictness(Strictness::None));
        store.add_record("Equipment", ["E1"]).unwrap();
        assert!(store.validate(Strictness::None).is_valid());
    }

    #[test]
    fn test_draft_reports_null_required_pointer() {
        let mut store = Store::with_config(catalog(), StoreConfig::default().with_strictness(Strictness::None));
        let e = store.add_record("Equipment", ["E1"]).unwrap();

        let report = store.validate(Strictness::Draft);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].record, e);
        assert_eq!(report.issues[0].field, Some(1));
        assert_eq!(report.issues[0].kind, IssueKind::NullRequiredPointer);
    }

    #[test]
    fn test_final_reports_missing_scalar_and_duplicates() {
        let mut store = Store::new(catalog());
        store.add_record("Zone", ["Z1"]).unwrap();
        let dup = store.add_record("Zone", ["z1"]).unwrap();
        store.add_record("Equipment", ["E1", "Z1"]).unwrap();

        let report = store.validate(Strictness::Final);
        let kinds: Vec<_> = report.issues.iter().map(|i| &i.kind).collect();
        assert!(kinds.iter().any(|k| matches!(k, IssueKind::MissingRequiredField)));
        assert_eq!(report.issues_for(dup).count(), 1);
    }

    #[test]
    fn test_raise_refused_then_lowered() {
        let mut store = Store::with_config(catalog(), StoreConfig::default().with_strictness(Strictness::None));
        store.add_record("Equipment", ["E1"]).unwrap();

        let err = store.set_strictness(Strictness::Draft).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::SchemaViolation);
        assert_eq!(store.strictness(), Strictness::None);

        store.set_strictness(Strictness::None).unwrap();
        assert_eq!(store.strictness(), Strictness::None);
    }

    #[test]
    fn test_raise_accepted_when_clean() {
        let mut store = Store::with_config(catalog(), StoreConfig::default().with_strictness(Strictness::None));
        store.add_record("Zone", ["Z1"]).unwrap();
        store.add_record("Equipment", ["E1", "Z1", "3"]).unwrap();

        store.set_strictness(Strictness::Final).unwrap();
        assert_eq!(store.strictness(), Strictness::Final);
    }
}

//! Compiled materialization plans
//!
//! A [`Plan`] is built once per `(type, compile options)` and holds one
//! pre-built routine per member, so rows are materialized without any
//! per-row discovery work. Column layouts seen at run time are resolved
//! once into a [`SchemaMapping`] and cached on the plan.

use super::model::{discover, MemberSpec, Record};
use crate::config::{CompileOptions, RuntimeOptions};
use crate::convert::{ConversionEngine, DiagnosticSink, MemberContext, RowContext};
use crate::error::{ConfigError, MaterializeError};
use crate::schema::NameResolver;
use crate::types::{ConversionOutcome, TargetType};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

static MISSING: Value = Value::Null;

/// Converts one raw value and assigns it into the instance
pub type MemberRoutine<T> = Box<
    dyn Fn(&mut T, &Value, &MemberContext<'_>) -> Result<ConversionOutcome<()>, MaterializeError>
        + Send
        + Sync,
>;

pub struct CompiledMember<T> {
    name: String,
    order_index: usize,
    declared_order: Option<i32>,
    target_type: TargetType,
    routine: MemberRoutine<T>,
}

impl<T: 'static> CompiledMember<T> {
    fn compile(order_index: usize, spec: MemberSpec<T>, engine: Arc<ConversionEngine>) -> Self {
        let target = spec.target.clone();
        let setter = spec.setter;

        let routine: MemberRoutine<T> = Box::new(move |instance: &mut T, raw: &Value, ctx: &MemberContext<'_>| {
            match engine.convert(raw, &target, ctx)? {
                ConversionOutcome::Value(cell) => {
                    if !setter(instance, cell) {
                        return Err(ConfigError::ValueTypeMismatch {
                            member: ctx.member().to_string(),
                            target_type: target.to_string(),
                            source_name: "converted",
                        }
                        .into());
                    }
                    Ok(ConversionOutcome::Value(()))
                }
                ConversionOutcome::SkipProperty => Ok(ConversionOutcome::SkipProperty),
                ConversionOutcome::SkipRow => Ok(ConversionOutcome::SkipRow),
            }
        });

        CompiledMember {
            name: spec.name,
            order_index,
            declared_order: spec.order,
            target_type: spec.target,
            routine,
        }
    }
}

impl<T> CompiledMember<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position in plan execution order
    pub fn order_index(&self) -> usize {
        self.order_index
    }

    pub fn declared_order(&self) -> Option<i32> {
        self.declared_order
    }

    pub fn target_type(&self) -> &TargetType {
        &self.target_type
    }

    /// Run the member routine against `instance`
    pub fn apply(
        &self,
        instance: &mut T,
        raw: &Value,
        ctx: &MemberContext<'_>,
    ) -> Result<ConversionOutcome<()>, MaterializeError> {
        (self.routine)(instance, raw, ctx)
    }
}

/// One input column bound to one plan member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedColumn {
    pub input_index: usize,
    pub member_index: usize,
}

/// Resolution of one input column layout against a plan's members
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaMapping {
    /// Sorted by member execution order
    pub entries: Vec<MappedColumn>,
    /// Input columns that matched no member
    pub unmapped_columns: Vec<String>,
    /// Members no column maps to; they keep their default value
    pub unfilled_members: Vec<String>,
}

pub struct Plan<T> {
    type_name: &'static str,
    members: Vec<CompiledMember<T>>,
    resolver: NameResolver,
    options: CompileOptions,
    mappings: RwLock<HashMap<Vec<String>, Arc<SchemaMapping>>>,
}

impl<T: Record> Plan<T> {
    pub(crate) fn build(options: &CompileOptions) -> Result<Self, ConfigError> {
        options.validate()?;
        let engine = Arc::new(ConversionEngine::new(options)?);

        let members: Vec<CompiledMember<T>> = discover::<T>()?
            .into_iter()
            .enumerate()
            .map(|(i, spec)| CompiledMember::compile(i, spec, engine.clone()))
            .collect();

        let plan = Plan {
            type_name: std::any::type_name::<T>(),
            members,
            resolver: NameResolver::new(options.resolver).case_sensitive(options.case_sensitive_headers),
            options: options.clone(),
            mappings: RwLock::new(HashMap::new()),
        };

        tracing::debug!(
            type_name = plan.type_name,
            members = plan.members.len(),
            culture = %options.culture.name,
            "compiled materialization plan"
        );
        Ok(plan)
    }

    /// Materialize one row. `Ok(None)` means the row was skipped.
    pub fn materialize_row(
        &self,
        mapping: &SchemaMapping,
        values: &[Value],
        row_index: usize,
        options: &RuntimeOptions,
        sink: Option<&dyn DiagnosticSink>,
    ) -> Result<Option<T>, MaterializeError> {
        let row = RowContext::new(row_index, options, sink);
        let mut instance = T::default();

        for entry in &mapping.entries {
            let member = &self.members[entry.member_index];
            let raw = values.get(entry.input_index).unwrap_or(&MISSING);
            let ctx = row.enter(&member.name);
            if member.apply(&mut instance, raw, &ctx)?.is_skip_row() {
                return Ok(None);
            }
        }

        Ok(Some(instance))
    }
}

impl<T> std::fmt::Debug for Plan<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plan")
            .field("type_name", &self.type_name)
            .field("members", &self.member_names())
            .field("options", &self.options)
            .field("mappings", &self.cached_mappings())
            .finish()
    }
}

impl<T> Plan<T> {
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn members(&self) -> &[CompiledMember<T>] {
        &self.members
    }

    pub fn member_names(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.name.as_str()).collect()
    }

    pub fn compile_options(&self) -> &CompileOptions {
        &self.options
    }

    /// Cached mapping for an input schema, resolving it on first sight
    pub fn schema_mapping<S: AsRef<str>>(&self, schema: &[S]) -> Arc<SchemaMapping> {
        let key: Vec<String> = schema.iter().map(|s| s.as_ref().to_string()).collect();

        if let Some(mapping) = self
            .mappings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return mapping.clone();
        }

        let mapping = Arc::new(self.resolve_schema(&key));
        self.mappings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_insert(mapping)
            .clone()
    }

    /// Number of distinct input schemas cached for this plan
    pub fn cached_mappings(&self) -> usize {
        self.mappings.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn resolve_schema(&self, schema: &[String]) -> SchemaMapping {
        let names = self.member_names();
        let resolutions = self.resolver.resolve_detailed(schema, &names[..]);

        // the resolver claims each member at most once, so its choice is the binding
        let mut claimed = HashSet::new();
        let mut entries = Vec::new();
        let mut unmapped_columns = Vec::new();

        for (input_index, resolution) in resolutions.iter().enumerate() {
            match resolution.candidate {
                Some(member_index) => {
                    claimed.insert(member_index);
                    entries.push(MappedColumn { input_index, member_index });
                }
                None => unmapped_columns.push(schema[input_index].clone()),
            }
        }

        entries.sort_by_key(|e| e.member_index);

        let unfilled_members = self
            .members
            .iter()
            .enumerate()
            .filter(|(i, _)| !claimed.contains(i))
            .map(|(_, m)| m.name.clone())
            .collect();

        tracing::debug!(
            type_name = self.type_name,
            mapped = entries.len(),
            unmapped = ?unmapped_columns,
            "resolved input schema"
        );

        SchemaMapping {
            entries,
            unmapped_columns,
            unfilled_members,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ErrorAction;
    use crate::plan::ModelBuilder;
    use serde_json::json;

    #[derive(Debug, Default, PartialEq)]
    struct Person {
        id: i64,
        full_name: String,
        age: i32,
        nickname: Option<String>,
    }

    impl Record for Person {
        fn describe(model: &mut ModelBuilder<Self>) {
            model.member("Id", |p: &mut Person, v| p.id = v).order(0);
            model.member("FullName", |p: &mut Person, v| p.full_name = v);
            model.member("Age", |p: &mut Person, v| p.age = v);
            model.member("Nickname", |p: &mut Person, v| p.nickname = v);
        }
    }

    fn plan() -> Plan<Person> {
        Plan::build(&CompileOptions::default()).unwrap()
    }

    #[test]
    fn test_plan_members() {
        let plan = plan();
        assert_eq!(plan.member_names(), vec!["Id", "FullName", "Age", "Nickname"]);
        assert_eq!(plan.members()[2].target_type(), &TargetType::I32);
        assert_eq!(plan.members()[0].declared_order(), Some(0));
    }

    #[test]
    fn test_schema_mapping_is_cached_per_schema() {
        let plan = plan();
        let first = plan.schema_mapping(&["id", "full_name", "extra"]);
        let again = plan.schema_mapping(&["id", "full_name", "extra"]);
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(plan.cached_mappings(), 1);

        assert_eq!(first.unmapped_columns, vec!["extra"]);
        assert_eq!(first.unfilled_members, vec!["Age", "Nickname"]);

        plan.schema_mapping(&["Age"]);
        assert_eq!(plan.cached_mappings(), 2);
    }

    #[test]
    fn test_mapping_follows_member_order_not_column_order() {
        let plan = plan();
        let mapping = plan.schema_mapping(&["Age", "FullName", "Id"]);
        let members: Vec<usize> = mapping.entries.iter().map(|e| e.member_index).collect();
        assert_eq!(members, vec![0, 1, 2]);
        assert_eq!(mapping.entries[0].input_index, 2);
    }

    #[test]
    fn test_duplicate_columns_map_once() {
        let plan = plan();
        let mapping = plan.schema_mapping(&["Id", "Id"]);
        assert_eq!(mapping.entries.len(), 1);
        assert_eq!(mapping.entries[0].input_index, 0);
        assert_eq!(mapping.unmapped_columns, vec!["Id"]);
    }

    #[derive(Debug, Default, PartialEq)]
    struct Pair {
        upper: String,
        lower: String,
    }

    impl Record for Pair {
        fn describe(model: &mut ModelBuilder<Self>) {
            model.member("Name", |p: &mut Pair, v| p.upper = v);
            model.member("name", |p: &mut Pair, v| p.lower = v);
        }
    }

    #[test]
    fn test_case_variant_members_bind_to_resolved_member() {
        let plan: Plan<Pair> = Plan::build(&CompileOptions::default()).unwrap();
        let mapping = plan.schema_mapping(&["name", "Name"]);
        assert_eq!(
            mapping.entries,
            vec![
                MappedColumn { input_index: 1, member_index: 0 },
                MappedColumn { input_index: 0, member_index: 1 },
            ]
        );
        assert!(mapping.unmapped_columns.is_empty());
        assert!(mapping.unfilled_members.is_empty());

        let row = vec![json!("lower-col"), json!("upper-col")];
        let pair = plan
            .materialize_row(&mapping, &row, 0, &RuntimeOptions::default(), None)
            .unwrap()
            .unwrap();
        assert_eq!(pair, Pair { upper: "upper-col".to_string(), lower: "lower-col".to_string() });
    }

    #[test]
    fn test_plan_debug_lists_members() {
        let rendered = format!("{:?}", plan());
        assert!(rendered.contains("FullName"));
    }

    #[test]
    fn test_case_sensitive_headers() {
        let options = CompileOptions {
            case_sensitive_headers: true,
            ..CompileOptions::default()
        };
        let plan: Plan<Person> = Plan::build(&options).unwrap();
        let mapping = plan.schema_mapping(&["id", "FullName"]);
        assert_eq!(mapping.entries.len(), 1);
        assert_eq!(mapping.unmapped_columns, vec!["id"]);
    }

    #[test]
    fn test_materialize_row() {
        let plan = plan();
        let mapping = plan.schema_mapping(&["Id", "FullName", "Age"]);
        let row = vec![json!("7"), json!("Ada Lovelace"), json!(36)];

        let person = plan
            .materialize_row(&mapping, &row, 0, &RuntimeOptions::default(), None)
            .unwrap()
            .unwrap();
        assert_eq!(
            person,
            Person { id: 7, full_name: "Ada Lovelace".to_string(), age: 36, nickname: None }
        );
    }

    #[test]
    fn test_short_row_reads_missing_values_as_null() {
        let plan = plan();
        let mapping = plan.schema_mapping(&["Id", "Nickname"]);
        let person = plan
            .materialize_row(&mapping, &[json!(1)], 0, &RuntimeOptions::default(), None)
            .unwrap()
            .unwrap();
        assert_eq!(person.nickname, None);
    }

    #[test]
    fn test_skip_outcomes() {
        let plan = plan();
        let mapping = plan.schema_mapping(&["Id", "Age"]);
        let row = vec![json!("1"), json!("old")];

        let skip_row = RuntimeOptions::default().with_default_action(ErrorAction::SkipRow);
        assert!(plan.materialize_row(&mapping, &row, 0, &skip_row, None).unwrap().is_none());

        let skip_prop = RuntimeOptions::default().with_default_action(ErrorAction::SkipProperty);
        let person = plan.materialize_row(&mapping, &row, 0, &skip_prop, None).unwrap().unwrap();
        assert_eq!(person.id, 1);
        assert_eq!(person.age, 0);
    }
}

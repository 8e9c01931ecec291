//! Member discovery for target types
//!
//! A [`Record`] describes its settable members once through a
//! [`ModelBuilder`]; the description is turned into a compiled plan and cached,
//! so `describe` runs once per `(type, compile options)`.

use crate::error::ConfigError;
use crate::types::{CellValue, FromCell, TargetType};
use std::collections::HashSet;
use std::sync::Arc;

/// A type rows can be materialized into.
///
/// `Default` is the constructor; `describe` lists the settable members.
///
/// ```rust
/// use anvil::plan::{ModelBuilder, Record};
///
/// #[derive(Default)]
/// struct Person {
///     id: i64,
///     name: String,
///     age: Option<u8>,
/// }
///
/// impl Record for Person {
///     fn describe(model: &mut ModelBuilder<Self>) {
///         model.member("Id", |p: &mut Person, v| p.id = v).order(0);
///         model.member("Name", |p: &mut Person, v| p.name = v);
///         model.member("Age", |p: &mut Person, v| p.age = v);
///     }
/// }
/// ```
pub trait Record: Default + Send + 'static {
    fn describe(model: &mut ModelBuilder<Self>);
}

/// Type-erased setter; returns false when the cell does not fit the field
pub(crate) type Setter<T> = Arc<dyn Fn(&mut T, CellValue) -> bool + Send + Sync>;

pub(crate) struct MemberSpec<T> {
    pub(crate) name: String,
    pub(crate) target: TargetType,
    pub(crate) order: Option<i32>,
    pub(crate) skipped: bool,
    pub(crate) setter: Setter<T>,
}

pub struct ModelBuilder<T> {
    members: Vec<MemberSpec<T>>,
}

impl<T: 'static> ModelBuilder<T> {
    fn new() -> Self {
        ModelBuilder {
            members: Vec::new(),
        }
    }

    /// Register a settable member of type `V`
    pub fn member<V, F>(&mut self, name: impl Into<String>, set: F) -> MemberHandle<'_, T>
    where
        V: FromCell,
        F: Fn(&mut T, V) + Send + Sync + 'static,
    {
        let setter: Setter<T> = Arc::new(move |instance: &mut T, cell: CellValue| match V::from_cell(cell) {
            Some(value) => {
                set(instance, value);
                true
            }
            None => false,
        });

        self.members.push(MemberSpec {
            name: name.into(),
            target: V::target_type(),
            order: None,
            skipped: false,
            setter,
        });

        let index = self.members.len() - 1;
        MemberHandle(&mut self.members[index])
    }
}

pub struct MemberHandle<'a, T>(&'a mut MemberSpec<T>);

impl<T> MemberHandle<'_, T> {
    /// Explicit position; ordered members run before unordered ones
    pub fn order(self, order: i32) -> Self {
        self.0.order = Some(order);
        self
    }

    /// Exclude the member from materialization
    pub fn skip(self) -> Self {
        self.0.skipped = true;
        self
    }
}

/// Describe `T` and return its members in execution order
pub(crate) fn discover<T: Record>() -> Result<Vec<MemberSpec<T>>, ConfigError> {
    let type_name = std::any::type_name::<T>();
    let mut model = ModelBuilder::new();
    T::describe(&mut model);

    let mut members: Vec<MemberSpec<T>> = model.members.into_iter().filter(|m| !m.skipped).collect();

    {
        let mut seen = HashSet::new();
        if let Some(dup) = members.iter().find(|m| !seen.insert(m.name.as_str())) {
            return Err(ConfigError::DuplicateMember {
                type_name,
                member: dup.name.clone(),
            });
        }
    }

    if members.is_empty() {
        return Err(ConfigError::NoSettableMembers { type_name });
    }

    // stable: unordered members keep declaration order
    members.sort_by_key(|m| (m.order.is_none(), m.order.unwrap_or(0)));
    Ok(members)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Ordered {
        a: i32,
        b: i32,
        c: i32,
        d: i32,
    }

    impl Record for Ordered {
        fn describe(model: &mut ModelBuilder<Self>) {
            model.member("A", |r: &mut Ordered, v| r.a = v);
            model.member("B", |r: &mut Ordered, v| r.b = v).order(2);
            model.member("C", |r: &mut Ordered, v| r.c = v);
            model.member("D", |r: &mut Ordered, v| r.d = v).order(1);
            model.member("Copy", |r: &mut Ordered, v: i32| r.a = v).skip();
        }
    }

    #[derive(Default)]
    struct Empty;

    impl Record for Empty {
        fn describe(_model: &mut ModelBuilder<Self>) {}
    }

    #[derive(Default)]
    struct Duplicated {
        x: i32,
    }

    impl Record for Duplicated {
        fn describe(model: &mut ModelBuilder<Self>) {
            model.member("X", |r: &mut Duplicated, v| r.x = v);
            model.member("X", |r: &mut Duplicated, v| r.x = v);
        }
    }

    #[test]
    fn test_member_order() {
        let members = discover::<Ordered>().unwrap();
        let names: Vec<&str> = members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["D", "B", "A", "C"]);
    }

    #[test]
    fn test_setter_rejects_wrong_cell() {
        let members = discover::<Ordered>().unwrap();
        let mut record = Ordered::default();
        assert!((members[0].setter)(&mut record, CellValue::Int(5)));
        assert_eq!(record.d, 5);
        assert!(!(members[0].setter)(&mut record, CellValue::Str("5".to_string())));
    }

    #[test]
    fn test_no_members_is_configuration_error() {
        assert!(matches!(
            discover::<Empty>(),
            Err(ConfigError::NoSettableMembers { .. })
        ));
    }

    #[test]
    fn test_duplicate_member_is_configuration_error() {
        assert!(matches!(
            discover::<Duplicated>(),
            Err(ConfigError::DuplicateMember { member, .. }) if member == "X"
        ));
    }
}

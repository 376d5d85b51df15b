//! SQL access, one module per table group.
//!
//! Functions take any MySQL executor so they run against the pool or inside a
//! caller's transaction (`&mut *tx`).

pub mod audit_log;
pub mod employees;
pub mod leave_requests;
pub mod notifications;
pub mod registry;
pub mod usage_details;
pub mod users;

/// Typed bind values for dynamically built WHERE clauses.
#[derive(Debug, Clone)]
pub(crate) enum FilterValue {
    I32(i32),
    U64(u64),
    Str(String),
    Bool(bool),
}

/// Accumulates `AND` conditions alongside their bind values.
#[derive(Debug, Default)]
pub(crate) struct Where {
    conditions: Vec<&'static str>,
    pub(crate) args: Vec<FilterValue>,
}

impl Where {
    pub(crate) fn push(&mut self, condition: &'static str, value: FilterValue) {
        self.conditions.push(condition);
        self.args.push(value);
    }

    pub(crate) fn push_many(&mut self, condition: &'static str, values: impl IntoIterator<Item = FilterValue>) {
        self.conditions.push(condition);
        self.args.extend(values);
    }

    pub(crate) fn sql(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" AND "))
        }
    }
}

macro_rules! bind_filters {
    ($query:expr, $args:expr) => {{
        let mut q = $query;
        for arg in $args {
            q = match arg {
                $crate::store::FilterValue::I32(v) => q.bind(*v),
                $crate::store::FilterValue::U64(v) => q.bind(*v),
                $crate::store::FilterValue::Str(v) => q.bind(v.as_str()),
                $crate::store::FilterValue::Bool(v) => q.bind(*v),
            };
        }
        q
    }};
}
pub(crate) use bind_filters;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn where_clause_joins_conditions() {
        let mut w = Where::default();
        assert_eq!(w.sql(), "");
        w.push("year = ?", FilterValue::I32(2025));
        w.push_many(
            "(name LIKE ? OR employee_num LIKE ?)",
            [FilterValue::Str("%a%".into()), FilterValue::Str("%a%".into())],
        );
        assert_eq!(w.sql(), " WHERE year = ? AND (name LIKE ? OR employee_num LIKE ?)");
        assert_eq!(w.args.len(), 3);
    }
}

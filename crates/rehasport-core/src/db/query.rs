use serde_json::Value as JsonValue;

///
/// Predicate
///
/// Conjunction of equality filters. An empty predicate matches every row.
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Predicate {
    filters: Vec<(String, JsonValue)>,
}

impl Predicate {
    #[must_use]
    pub const fn all() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    /// Add an equality filter on `field`.
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    #[must_use]
    pub fn filters(&self) -> &[(String, JsonValue)] {
        &self.filters
    }

    /// Missing fields never match, including filters against `null`.
    #[must_use]
    pub fn matches(&self, row: &serde_json::Map<String, JsonValue>) -> bool {
        self.filters
            .iter()
            .all(|(field, expected)| row.get(field) == Some(expected))
    }
}

///
/// Direction
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

///
/// Order
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Order {
    pub field: String,
    pub direction: Direction,
}

impl Order {
    #[must_use]
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    #[must_use]
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }
}

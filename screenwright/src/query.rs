//! Ordered multi-strategy element queries
//!
//! A [`Query`] is a list of alternative [`Strategy`] values tried in order
//! plus post-filters every candidate must pass. The first strategy that
//! yields an accepted candidate wins; later strategies are not consulted.

use crate::element::AttributeSnapshot;
use crate::errors::AutomationError;
use crate::selector::Selector;
use std::fmt;
use std::sync::Arc;

/// Where a proximity tie-break measures distance from
#[derive(Debug, Clone)]
pub enum Anchor {
    /// A fixed vertical coordinate
    Y(f64),
    /// The vertical centre of whatever this query resolves to
    Element(Box<Query>),
}

/// How a strategy picks one element out of several accepted candidates
#[derive(Debug, Clone, Default)]
pub enum TieBreak {
    /// First candidate in tree-traversal order
    #[default]
    First,
    /// Candidate whose vertical centre is closest to the anchor.
    /// Candidates farther than `max_distance` are rejected as unrelated;
    /// `None` uses the configured proximity threshold.
    ClosestToAnchor {
        anchor: Anchor,
        max_distance: Option<f64>,
    },
}

/// One predicate over the live tree, named for diagnostics
#[derive(Debug, Clone)]
pub struct Strategy {
    pub name: String,
    pub selector: Selector,
    pub tie_break: TieBreak,
}

impl Strategy {
    pub fn new(name: impl Into<String>, selector: impl Into<Selector>) -> Self {
        Self {
            name: name.into(),
            selector: selector.into(),
            tie_break: TieBreak::First,
        }
    }

    pub fn by_label(label: &str) -> Self {
        Self::from_selector(Selector::Label(label.to_string()))
    }

    pub fn by_label_contains(text: &str) -> Self {
        Self::from_selector(Selector::LabelContains(text.to_string()))
    }

    pub fn by_label_matching(pattern: &str) -> Self {
        Self::from_selector(Selector::LabelMatches(pattern.to_string()))
    }

    pub fn by_name(name: &str) -> Self {
        Self::from_selector(Selector::Name(name.to_string()))
    }

    pub fn by_type(element_type: &str, label: Option<&str>) -> Self {
        Self::from_selector(Selector::Type {
            element_type: element_type.to_string(),
            label: label.map(str::to_string),
        })
    }

    pub fn by_predicate(predicate: &str) -> Self {
        Self::from_selector(Selector::Predicate(predicate.to_string()))
    }

    fn from_selector(selector: Selector) -> Self {
        Self {
            name: selector.describe(),
            selector,
            tie_break: TieBreak::First,
        }
    }

    /// Prefer the candidate nearest a fixed Y coordinate.
    pub fn closest_to_y(mut self, y: f64, max_distance: Option<f64>) -> Self {
        self.tie_break = TieBreak::ClosestToAnchor {
            anchor: Anchor::Y(y),
            max_distance,
        };
        self
    }

    /// Prefer the candidate nearest the element `anchor` resolves to,
    /// e.g. the "+" button on the same row as a label.
    pub fn closest_to(mut self, anchor: Query, max_distance: Option<f64>) -> Self {
        self.tie_break = TieBreak::ClosestToAnchor {
            anchor: Anchor::Element(Box::new(anchor)),
            max_distance,
        };
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

type FilterFn = Arc<dyn Fn(&AttributeSnapshot) -> bool + Send + Sync>;

/// Policy check applied to every raw candidate of every strategy
#[derive(Clone)]
pub enum PostFilter {
    /// Reject candidates whose label contains the text (case-insensitive)
    ExcludeLabelContaining(String),
    RequireEnabled,
    /// Reject candidates the driver reports as not visible
    RequireVisible,
    Custom { name: String, predicate: FilterFn },
}

impl PostFilter {
    pub fn custom(
        name: impl Into<String>,
        predicate: impl Fn(&AttributeSnapshot) -> bool + Send + Sync + 'static,
    ) -> Self {
        PostFilter::Custom {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn accepts(&self, candidate: &AttributeSnapshot) -> bool {
        match self {
            PostFilter::ExcludeLabelContaining(text) => !candidate
                .label
                .as_deref()
                .map(|l| l.to_lowercase().contains(&text.to_lowercase()))
                .unwrap_or(false),
            PostFilter::RequireEnabled => candidate.enabled,
            PostFilter::RequireVisible => candidate.visible != Some(false),
            PostFilter::Custom { predicate, .. } => predicate(candidate),
        }
    }
}

impl fmt::Debug for PostFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostFilter::ExcludeLabelContaining(text) => {
                f.debug_tuple("ExcludeLabelContaining").field(text).finish()
            }
            PostFilter::RequireEnabled => f.write_str("RequireEnabled"),
            PostFilter::RequireVisible => f.write_str("RequireVisible"),
            PostFilter::Custom { name, .. } => f.debug_tuple("Custom").field(name).finish(),
        }
    }
}

/// Ordered, non-empty list of strategies plus post-filters
#[derive(Debug, Clone)]
pub struct Query {
    description: String,
    strategies: Vec<Strategy>,
    filters: Vec<PostFilter>,
}

impl Query {
    /// Build a query from its strategies. At least one strategy is required.
    pub fn new(
        description: impl Into<String>,
        strategies: Vec<Strategy>,
    ) -> Result<Self, AutomationError> {
        let description = description.into();
        if strategies.is_empty() {
            return Err(AutomationError::InvalidArgument(format!(
                "query '{description}' has no strategies"
            )));
        }
        Ok(Self {
            description,
            strategies,
            filters: Vec::new(),
        })
    }

    /// Single-strategy query; the description is the strategy name.
    pub fn single(strategy: Strategy) -> Self {
        Self {
            description: strategy.name.clone(),
            strategies: vec![strategy],
            filters: Vec::new(),
        }
    }

    /// Start a builder. `build` fails if no strategy was added.
    pub fn builder(description: impl Into<String>) -> QueryBuilder {
        QueryBuilder {
            description: description.into(),
            strategies: Vec::new(),
            filters: Vec::new(),
        }
    }

    pub fn with_filter(mut self, filter: PostFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    pub fn filters(&self) -> &[PostFilter] {
        &self.filters
    }

    /// True when every post-filter accepts the candidate.
    pub fn accepts(&self, candidate: &AttributeSnapshot) -> bool {
        self.filters.iter().all(|f| f.accepts(candidate))
    }

    pub fn strategy_names(&self) -> Vec<String> {
        self.strategies.iter().map(|s| s.name.clone()).collect()
    }
}

impl From<Strategy> for Query {
    fn from(strategy: Strategy) -> Self {
        Query::single(strategy)
    }
}

impl From<Selector> for Query {
    fn from(selector: Selector) -> Self {
        Query::single(Strategy::from_selector(selector))
    }
}

impl From<&str> for Query {
    fn from(s: &str) -> Self {
        Query::from(Selector::from(s))
    }
}

pub struct QueryBuilder {
    description: String,
    strategies: Vec<Strategy>,
    filters: Vec<PostFilter>,
}

impl QueryBuilder {
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn selector(self, selector: impl Into<Selector>) -> Self {
        self.strategy(Strategy::from_selector(selector.into()))
    }

    pub fn filter(mut self, filter: PostFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn exclude_label_containing(self, text: &str) -> Self {
        self.filter(PostFilter::ExcludeLabelContaining(text.to_string()))
    }

    pub fn build(self) -> Result<Query, AutomationError> {
        let mut query = Query::new(self.description, self.strategies)?;
        query.filters = self.filters;
        Ok(query)
    }
}

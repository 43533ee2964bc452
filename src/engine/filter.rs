use smallvec::SmallVec;
use tantivy::query::{AllQuery, BooleanQuery, EmptyQuery, Query, TermQuery, TermSetQuery};
use tantivy::Term;

use crate::record::{DocumentCodec, Record};
use crate::schema::SemanticType;
use crate::types::{Direction, ElementId, ElementKind};

/// How the query tokens of a [`Filter::Property`] combine.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TokenMatch {
    /// Every token must be present.
    All,
    /// At least one token must be present.
    Any,
}

impl TokenMatch {
    /// Analyzed text matches on any query word; every other type needs all
    /// of its tokens.
    pub fn for_type(ty: SemanticType) -> Self {
        match ty {
            SemanticType::Text => TokenMatch::Any,
            _ => TokenMatch::All,
        }
    }
}

/// Composable restriction over stored documents.
///
/// Filters are built by the graph layer and compiled to engine queries only
/// when a page is fetched, so a cursor can re-issue the same filter for every
/// page.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    /// Every document.
    All,
    /// Documents of one element kind.
    Kind(ElementKind),
    /// Documents holding the tokens for `field`, combined per `mode`.
    Property {
        /// Property name.
        field: String,
        /// Query-side encoded tokens.
        tokens: Vec<String>,
        /// Whether all or any of `tokens` must match.
        mode: TokenMatch,
    },
    /// Edges whose `direction` endpoint is `vertex`.
    Endpoint {
        /// Which endpoint field to match.
        direction: Direction,
        /// Endpoint vertex id.
        vertex: ElementId,
    },
    /// Edges carrying any of the labels.
    Labels(SmallVec<[String; 4]>),
    /// Documents with the given user id.
    UserId(String),
    /// Conjunction.
    And(Vec<Filter>),
    /// Disjunction.
    Or(Vec<Filter>),
}

impl Filter {
    /// Property filter over `tokens`, matched the way `ty` requires.
    pub fn property(field: impl Into<String>, ty: SemanticType, tokens: Vec<String>) -> Filter {
        Filter::Property {
            field: field.into(),
            tokens,
            mode: TokenMatch::for_type(ty),
        }
    }

    /// `self AND other`, flattening nested conjunctions.
    pub fn and(self, other: Filter) -> Filter {
        match (self, other) {
            (Filter::All, f) | (f, Filter::All) => f,
            (Filter::And(mut left), Filter::And(right)) => {
                left.extend(right);
                Filter::And(left)
            }
            (Filter::And(mut left), f) => {
                left.push(f);
                Filter::And(left)
            }
            (f, Filter::And(mut right)) => {
                right.insert(0, f);
                Filter::And(right)
            }
            (a, b) => Filter::And(vec![a, b]),
        }
    }

    /// Label set filter; `None` when `labels` is empty.
    pub fn labels<I, S>(labels: I) -> Option<Filter>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: SmallVec<[String; 4]> = labels.into_iter().map(Into::into).collect();
        if set.is_empty() {
            None
        } else {
            Some(Filter::Labels(set))
        }
    }

    /// Evaluates the filter against an in-memory record.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Filter::All => true,
            Filter::Kind(kind) => record.kind() == *kind,
            Filter::Property {
                field,
                tokens,
                mode,
            } => match record.terms().get(field) {
                Some(stored) if !tokens.is_empty() => match mode {
                    TokenMatch::All => tokens.iter().all(|t| stored.contains(t)),
                    TokenMatch::Any => tokens.iter().any(|t| stored.contains(t)),
                },
                _ => false,
            },
            Filter::Endpoint { direction, vertex } => record.endpoint(*direction) == Some(*vertex),
            Filter::Labels(labels) => record
                .label()
                .is_some_and(|label| labels.iter().any(|l| l == label)),
            Filter::UserId(user_id) => record.user_id() == Some(user_id.as_str()),
            Filter::And(filters) => filters.iter().all(|f| f.matches(record)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(record)),
        }
    }

    pub(crate) fn to_query(&self, codec: &DocumentCodec) -> Box<dyn Query> {
        let term = |t: Term| -> Box<dyn Query> { Box::new(TermQuery::new(t, codec.record_option())) };
        match self {
            Filter::All => Box::new(AllQuery),
            Filter::Kind(kind) => term(codec.kind_term(*kind)),
            Filter::Property {
                field,
                tokens,
                mode,
            } => {
                if tokens.is_empty() {
                    return Box::new(EmptyQuery);
                }
                let clauses = tokens
                    .iter()
                    .map(|token| term(codec.property_term(field, token)))
                    .collect();
                match mode {
                    TokenMatch::All => Box::new(BooleanQuery::intersection(clauses)),
                    TokenMatch::Any => Box::new(BooleanQuery::union(clauses)),
                }
            }
            Filter::Endpoint { direction, vertex } => term(codec.endpoint_term(*direction, *vertex)),
            Filter::Labels(labels) => Box::new(TermSetQuery::new(
                labels.iter().map(|label| codec.label_term(label)),
            )),
            Filter::UserId(user_id) => term(codec.user_id_term(user_id)),
            Filter::And(filters) => {
                if filters.is_empty() {
                    return Box::new(AllQuery);
                }
                Box::new(BooleanQuery::intersection(
                    filters.iter().map(|f| f.to_query(codec)).collect(),
                ))
            }
            Filter::Or(filters) => {
                if filters.is_empty() {
                    return Box::new(EmptyQuery);
                }
                Box::new(BooleanQuery::union(
                    filters.iter().map(|f| f.to_query(codec)).collect(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_flattens_and_drops_all() {
        let f = Filter::Kind(ElementKind::Edge)
            .and(Filter::All)
            .and(Filter::Endpoint {
                direction: Direction::Out,
                vertex: ElementId(1),
            })
            .and(Filter::UserId("x".into()));
        match f {
            Filter::And(parts) => assert_eq!(parts.len(), 3),
            other => panic!("unexpected filter {other:?}"),
        }
    }

    #[test]
    fn matches_evaluates_records_in_memory() {
        let edge = Record::edge(ElementId(5), None, "knows", ElementId(1), ElementId(2));
        let filter = Filter::Kind(ElementKind::Edge)
            .and(Filter::Endpoint {
                direction: Direction::In,
                vertex: ElementId(2),
            })
            .and(Filter::labels(["likes", "knows"]).unwrap());
        assert!(filter.matches(&edge));
        assert!(!Filter::labels(["likes"]).unwrap().matches(&edge));
        assert!(!Filter::Kind(ElementKind::Vertex).matches(&edge));

        let mut vertex = Record::vertex(ElementId(1), None);
        vertex.set_terms("bio", vec!["peter".into(), "something".into()]);
        let hit = Filter::property("bio", SemanticType::StringLowercase, vec!["something".into()]);
        let miss = Filter::property(
            "bio",
            SemanticType::StringLowercase,
            vec!["something".into(), "else".into()],
        );
        assert!(hit.matches(&vertex));
        assert!(!miss.matches(&vertex));
    }

    #[test]
    fn text_tokens_match_on_any_word() {
        let mut vertex = Record::vertex(ElementId(1), None);
        vertex.set_terms("bio", vec!["graph".into(), "databases".into()]);
        let words = vec!["graph".to_string(), "tables".to_string()];

        let text = Filter::property("bio", SemanticType::Text, words.clone());
        assert_eq!(
            text,
            Filter::Property {
                field: "bio".into(),
                tokens: words.clone(),
                mode: TokenMatch::Any,
            }
        );
        assert!(text.matches(&vertex));
        assert!(!Filter::property("bio", SemanticType::Text, vec!["tables".into()]).matches(&vertex));
        assert!(!Filter::property("bio", SemanticType::String, words).matches(&vertex));
        assert!(!Filter::property("bio", SemanticType::Text, Vec::new()).matches(&vertex));
    }

    #[test]
    fn empty_label_set_is_no_filter() {
        assert!(Filter::labels(Vec::<String>::new()).is_none());
        assert!(matches!(Filter::labels(["knows"]), Some(Filter::Labels(_))));
    }
}

//! Decoding payloads whose message type isn't known up front.
//!
//! The type is resolved in order from an explicit [mapping](crate::mapping), from the types
//! previously picked for the same endpoint, or by decoding the payload as every known message
//! type and keeping the one with the best [`Score`].

use crate::config::MatcherConfig;
use crate::mapping::{Direction, MappingTable};
use crate::registry::SchemaRegistry;
use crate::render::render;
use crate::schema::SchemaSet;
use log::{debug, warn};
use parking_lot::RwLock;
use snafu::Snafu;
use std::collections::HashMap;
use std::sync::Arc;

mod score;
pub use score::Score;

/// Decoding with an asserted message type failed.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum MatchError
{
    /// The type isn't defined by the current schemas.
    #[snafu(display("Message type '{}' is not defined by any schema", type_name))]
    TypeNotDefined
    {
        /// Requested type.
        type_name: String,
    },

    /// The payload isn't a structurally valid encoding of the type.
    #[snafu(display("Payload is not a valid '{}' message", type_name))]
    InvalidPayload
    {
        /// Requested type.
        type_name: String,
    },
}

/// How the message type of a decoded payload was chosen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution
{
    /// A mapping applied to the URL and direction.
    Mapping,

    /// The caller named the type.
    Requested,

    /// The type was picked for the same endpoint earlier.
    Cache,

    /// The type scored best among all known types.
    AutoMatch(Score),
}

/// A payload decoded and rendered as a specific message type.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMessage
{
    /// Fully qualified name of the message type.
    pub type_name: String,

    /// The message rendered as JSON.
    pub text: String,

    /// How the type was chosen.
    pub resolution: Resolution,
}

/// Key under which the auto matched type of an endpoint is cached.
///
/// The query string is dropped so requests differing only in their parameters share a type.
///
/// ```
/// use protosniff::mapping::Direction;
/// use protosniff::matcher::cache_key;
///
/// assert_eq!(
///     cache_key("https://h/api/users?page=1", Direction::Response),
///     "response:https://h/api/users"
/// );
/// ```
pub fn cache_key(url: &str, direction: Direction) -> String
{
    let path = url.split('?').next().unwrap_or(url);
    format!("{}:{}", direction, path)
}

/// Resolves message types for intercepted payloads and decodes them.
///
/// Shared between any number of threads. Decoding only takes read locks, except for inserting
/// a freshly scored type into the cache.
#[derive(Debug)]
pub struct AutoMatcher
{
    registry: Arc<SchemaRegistry>,
    mappings: Arc<MappingTable>,
    config: MatcherConfig,
    cache: RwLock<HashMap<String, String>>,
}

impl AutoMatcher
{
    /// Creates a matcher over a registry and mapping table.
    pub fn new(
        registry: Arc<SchemaRegistry>,
        mappings: Arc<MappingTable>,
        config: MatcherConfig,
    ) -> Self
    {
        AutoMatcher {
            registry,
            mappings,
            config,
            cache: Default::default(),
        }
    }

    /// Decodes an intercepted payload.
    ///
    /// Returns `Ok(None)` if no mapping applies and no known type explains the payload. Errors
    /// are only returned when a mapping names the type and decoding as that type fails.
    pub fn decode(
        &self,
        raw: &[u8],
        url: &str,
        direction: Direction,
    ) -> Result<Option<DecodedMessage>, MatchError>
    {
        let set = self.registry.snapshot();

        if let Some(type_name) = self.mappings.find_message_for_url(url, direction) {
            return self
                .decode_with(&set, raw, &type_name, Resolution::Mapping)
                .map(Some);
        }

        if !self.config.auto_match {
            debug!("No mapping for {} {} and auto-matching is disabled", direction, url);
            return Ok(None);
        }

        let key = cache_key(url, direction);
        if self.config.cache_auto_matches {
            if let Some(decoded) = self.decode_cached(&set, raw, &key) {
                return Ok(Some(decoded));
            }
        }

        let decoded = match self.best_match(&set, raw) {
            Some(decoded) => decoded,
            None => return Ok(None),
        };

        if self.config.cache_auto_matches {
            self.cache
                .write()
                .insert(key, decoded.type_name.clone());
        }

        Ok(Some(decoded))
    }

    /// Decodes a payload by scoring every known type, without any URL context.
    ///
    /// Nothing is cached.
    pub fn auto_match_decode(&self, raw: &[u8]) -> Option<DecodedMessage>
    {
        self.best_match(&self.registry.snapshot(), raw)
    }

    /// Decodes a payload as a named type.
    pub fn decode_as(&self, raw: &[u8], type_name: &str) -> Result<DecodedMessage, MatchError>
    {
        self.decode_with(
            &self.registry.snapshot(),
            raw,
            type_name,
            Resolution::Requested,
        )
    }

    /// Forgets every auto matched type.
    pub fn clear_auto_cache(&self)
    {
        self.cache.write().clear();
        debug!("Cleared auto-match cache");
    }

    /// Number of endpoints with a cached type.
    pub fn cache_len(&self) -> usize
    {
        self.cache.read().len()
    }

    /// The type cached for an endpoint, if any.
    pub fn cached_type(&self, url: &str, direction: Direction) -> Option<String>
    {
        self.cache.read().get(&cache_key(url, direction)).cloned()
    }

    fn decode_with(
        &self,
        set: &SchemaSet,
        raw: &[u8],
        type_name: &str,
        resolution: Resolution,
    ) -> Result<DecodedMessage, MatchError>
    {
        let info = set
            .get_message(type_name)
            .ok_or_else(|| MatchError::TypeNotDefined {
                type_name: type_name.to_string(),
            })?;

        let msg = info.decode(raw, set);
        if !msg.is_well_formed() {
            return InvalidPayload { type_name }.fail();
        }

        debug!("Decoded payload as {} ({:?})", type_name, resolution);
        Ok(DecodedMessage {
            type_name: type_name.to_string(),
            text: render(&msg, set, self.config.pretty),
            resolution,
        })
    }

    fn decode_cached(&self, set: &SchemaSet, raw: &[u8], key: &str) -> Option<DecodedMessage>
    {
        let type_name = self.cache.read().get(key).cloned()?;

        match self.decode_with(set, raw, &type_name, Resolution::Cache) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!("Ignoring cached type for {}: {}", key, e);
                None
            }
        }
    }

    fn best_match(&self, set: &SchemaSet, raw: &[u8]) -> Option<DecodedMessage>
    {
        // Every type decodes an empty payload, so there's nothing to choose with.
        if raw.is_empty() {
            return None;
        }

        let mut best: Option<(&str, Score, _)> = None;

        // Candidates come in name order. Only a strictly better score replaces the current best
        // so ties go to the name that sorts first.
        for info in set.iter_messages() {
            let msg = info.decode(raw, set);
            let score = match Score::evaluate(&msg, set) {
                Some(score) if score.has_evidence() => score,
                _ => continue,
            };

            debug!(
                "Candidate {}: weight {:.2} ({:?})",
                info.full_name,
                score.weight(),
                score
            );

            let better = match &best {
                Some((_, current, _)) => score.weight() > current.weight(),
                None => true,
            };
            if better {
                best = Some((info.full_name.as_str(), score, msg));
            }
        }

        let (type_name, score, msg) = best?;
        debug!("Auto-matched payload as {}", type_name);

        Some(DecodedMessage {
            type_name: type_name.to_string(),
            text: render(&msg, set, self.config.pretty),
            resolution: Resolution::AutoMatch(score),
        })
    }
}

#[cfg(test)]
mod test
{
    use super::*;
    use crate::mapping::MappingDirection;

    fn setup(schema: &str) -> (AutoMatcher, Arc<MappingTable>)
    {
        let registry = Arc::new(SchemaRegistry::new());
        registry.add_file("test.proto", schema).unwrap();

        let mappings = Arc::new(MappingTable::new());
        let config = MatcherConfig {
            pretty: false,
            ..Default::default()
        };

        (
            AutoMatcher::new(registry, mappings.clone(), config),
            mappings,
        )
    }

    const SCHEMA: &str = r#"
        syntax = "proto3";
        package api;

        message Empty {}
        message User { string name = 1; int32 age = 2; }
        message Title { string title = 1; }
    "#;

    #[test]
    fn cache_keys()
    {
        assert_eq!(
            cache_key("https://h/api/users?page=1", Direction::Response),
            "response:https://h/api/users"
        );
        assert_eq!(
            cache_key("http://h:8080/a/b", Direction::Request),
            "request:http://h:8080/a/b"
        );
        assert_eq!(
            cache_key("https://h/x?a=1?b=2", Direction::Request),
            "request:https://h/x"
        );
    }

    #[test]
    fn best_explanation_wins()
    {
        let (matcher, _) = setup(SCHEMA);

        let decoded = matcher.auto_match_decode(b"\x0a\x03Bob\x10\x2a").unwrap();
        assert_eq!(decoded.type_name, "api.User");
        assert_eq!(decoded.text, r#"{"age":42,"name":"Bob"}"#);
        match decoded.resolution {
            Resolution::AutoMatch(score) => assert_eq!(score.matched_fields, 2),
            other => panic!("Unexpected resolution: {:?}", other),
        }
    }

    #[test]
    fn ties_prefer_first_name()
    {
        let (matcher, _) = setup(SCHEMA);

        // Title and User both explain a lone string in field 1. Title covers more of its type.
        let decoded = matcher.auto_match_decode(b"\x0a\x03Bob").unwrap();
        assert_eq!(decoded.type_name, "api.Title");

        let (matcher, _) = setup(
            r#"
            syntax = "proto3";
            message B { string b = 1; }
            message A { string a = 1; }
        "#,
        );
        let decoded = matcher.auto_match_decode(b"\x0a\x01x").unwrap();
        assert_eq!(decoded.type_name, "A");
    }

    #[test]
    fn no_match()
    {
        let (matcher, _) = setup(SCHEMA);

        assert_eq!(matcher.auto_match_decode(b""), None);
        assert_eq!(matcher.auto_match_decode(b"\x0a\x10short"), None);
        assert_eq!(matcher.auto_match_decode(b"\x78\x01"), None);
        assert_eq!(
            matcher
                .decode(b"\xff\xff", "https://h/x", Direction::Response)
                .unwrap(),
            None
        );
        assert_eq!(matcher.cache_len(), 0);
    }

    #[test]
    fn mapping_takes_precedence()
    {
        let (matcher, mappings) = setup(SCHEMA);
        mappings.add("*/titles*", "api.Title", MappingDirection::Both, "");

        let decoded = matcher
            .decode(b"\x0a\x03Bob\x10\x2a", "https://h/titles/1", Direction::Request)
            .unwrap()
            .unwrap();
        assert_eq!(decoded.type_name, "api.Title");
        assert_eq!(decoded.resolution, Resolution::Mapping);
        assert_eq!(decoded.text, r#"{"2":42,"title":"Bob"}"#);
        assert_eq!(matcher.cache_len(), 0);
    }

    #[test]
    fn mapping_failures_are_errors()
    {
        let (matcher, mappings) = setup(SCHEMA);
        mappings.add("*/missing", "api.Missing", MappingDirection::Both, "");
        mappings.add("*/user", "api.User", MappingDirection::Both, "");

        match matcher.decode(b"\x0a\x01x", "https://h/missing", Direction::Response) {
            Err(MatchError::TypeNotDefined { type_name }) => assert_eq!(type_name, "api.Missing"),
            other => panic!("Expected missing type: {:?}", other),
        }

        match matcher.decode(b"\x0a\x09x", "https://h/user", Direction::Response) {
            Err(MatchError::InvalidPayload { type_name }) => assert_eq!(type_name, "api.User"),
            other => panic!("Expected invalid payload: {:?}", other),
        }
    }

    #[test]
    fn cache_round_trip()
    {
        let (matcher, _) = setup(SCHEMA);

        let first = matcher
            .decode(b"\x0a\x03Bob\x10\x2a", "https://h/api/users?page=1", Direction::Response)
            .unwrap()
            .unwrap();
        assert!(matches!(first.resolution, Resolution::AutoMatch(..)));
        assert_eq!(matcher.cache_len(), 1);
        assert_eq!(
            matcher.cached_type("https://h/api/users", Direction::Response),
            Some("api.User".to_string())
        );

        // Alone this payload would score as Title, the cache keeps it on User.
        let second = matcher
            .decode(b"\x0a\x03Amy", "https://h/api/users?page=2", Direction::Response)
            .unwrap()
            .unwrap();
        assert_eq!(second.type_name, "api.User");
        assert_eq!(second.resolution, Resolution::Cache);

        // Different direction, different entry.
        let request = matcher
            .decode(b"\x0a\x03Amy", "https://h/api/users", Direction::Request)
            .unwrap()
            .unwrap();
        assert_eq!(request.type_name, "api.Title");
        assert_eq!(matcher.cache_len(), 2);

        matcher.clear_auto_cache();
        assert_eq!(matcher.cache_len(), 0);
    }

    #[test]
    fn stale_cache_entry_is_rescored()
    {
        let registry = Arc::new(SchemaRegistry::new());
        let id = registry.add_file("test.proto", SCHEMA).unwrap();
        let matcher = AutoMatcher::new(
            registry.clone(),
            Arc::new(MappingTable::new()),
            MatcherConfig::default(),
        );

        matcher
            .decode(b"\x0a\x03Bob", "https://h/t", Direction::Response)
            .unwrap()
            .unwrap();
        assert_eq!(
            matcher.cached_type("https://h/t", Direction::Response),
            Some("api.Title".to_string())
        );

        // The cached type disappears with the schema change.
        let without_title = SCHEMA.replace("message Title { string title = 1; }", "");
        registry
            .update_file(&id, "test.proto", &without_title)
            .unwrap();

        let decoded = matcher
            .decode(b"\x0a\x03Bob", "https://h/t", Direction::Response)
            .unwrap()
            .unwrap();
        assert_eq!(decoded.type_name, "api.User");
        assert!(matches!(decoded.resolution, Resolution::AutoMatch(..)));
        assert_eq!(
            matcher.cached_type("https://h/t", Direction::Response),
            Some("api.User".to_string())
        );
    }

    #[test]
    fn configuration_switches()
    {
        let registry = Arc::new(SchemaRegistry::new());
        registry.add_file("test.proto", SCHEMA).unwrap();
        let mappings = Arc::new(MappingTable::new());

        let disabled = AutoMatcher::new(
            registry.clone(),
            mappings.clone(),
            MatcherConfig {
                auto_match: false,
                ..Default::default()
            },
        );
        assert_eq!(
            disabled
                .decode(b"\x0a\x03Bob", "https://h/t", Direction::Response)
                .unwrap(),
            None
        );

        let uncached = AutoMatcher::new(
            registry,
            mappings,
            MatcherConfig {
                cache_auto_matches: false,
                ..Default::default()
            },
        );
        let decoded = uncached
            .decode(b"\x0a\x03Bob", "https://h/t", Direction::Response)
            .unwrap()
            .unwrap();
        assert_eq!(decoded.text, "{\n  \"title\": \"Bob\"\n}");
        assert_eq!(uncached.cache_len(), 0);
    }
}

//! User declared bindings from URL patterns to message types.

use log::{debug, info};
use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize};
use snafu::Snafu;
use std::fmt;
use std::str::FromStr;

/// Mapping table error.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum MappingError
{
    /// No mapping with the id exists.
    #[snafu(display("Mapping '{}' not found", id))]
    NotFound
    {
        /// Requested id.
        id: String,
    },

    /// Traffic direction was neither `request` nor `response`.
    #[snafu(display("Invalid direction '{}', expected 'request' or 'response'", value))]
    InvalidDirection
    {
        /// The rejected value.
        value: String,
    },
}

/// Direction of a single piece of traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction
{
    /// Outgoing request body.
    Request,

    /// Incoming response body.
    Response,
}

/// Directions a mapping applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingDirection
{
    /// Requests only.
    Request,

    /// Responses only.
    Response,

    /// Both requests and responses.
    Both,
}

/// Binds URLs matching a pattern to a message type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mapping
{
    /// Unique id assigned when the mapping is added.
    #[serde(default)]
    pub id: String,

    /// Glob pattern matched against the whole URL. `*` matches any run of characters.
    pub url_pattern: String,

    /// Fully qualified message type.
    pub message_type: String,

    /// Directions the mapping applies to.
    #[serde(default, deserialize_with = "deserialize_direction")]
    pub direction: MappingDirection,

    /// Free form description.
    #[serde(default)]
    pub description: String,
}

/// Ordered list of mappings. The first match wins.
#[derive(Debug, Default)]
pub struct MappingTable
{
    mappings: RwLock<Vec<Mapping>>,
}

impl Direction
{
    /// Lowercase name, as used in cache keys.
    pub fn as_str(self) -> &'static str
    {
        match self {
            Direction::Request => "request",
            Direction::Response => "response",
        }
    }
}

impl fmt::Display for Direction
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction
{
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s {
            "request" => Ok(Direction::Request),
            "response" => Ok(Direction::Response),
            _ => InvalidDirection { value: s }.fail(),
        }
    }
}

impl Default for MappingDirection
{
    fn default() -> Self
    {
        MappingDirection::Response
    }
}

impl MappingDirection
{
    /// Parses a direction the way the front end sends them.
    ///
    /// Anything other than `request`, `response` or `both`, including a missing value, means
    /// `response`.
    pub fn parse(value: Option<&str>) -> Self
    {
        match value {
            Some("request") => MappingDirection::Request,
            Some("both") => MappingDirection::Both,
            _ => MappingDirection::Response,
        }
    }

    /// True if a mapping with this direction applies to traffic in the given direction.
    pub fn applies_to(self, direction: Direction) -> bool
    {
        match (self, direction) {
            (MappingDirection::Both, _) => true,
            (MappingDirection::Request, Direction::Request) => true,
            (MappingDirection::Response, Direction::Response) => true,
            _ => false,
        }
    }
}

fn deserialize_direction<'de, D>(deserializer: D) -> Result<MappingDirection, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(MappingDirection::parse(value.as_deref()))
}

impl Mapping
{
    /// True if the mapping applies to the URL and direction.
    pub fn matches(&self, url: &str, direction: Direction) -> bool
    {
        self.direction.applies_to(direction) && glob_match(&self.url_pattern, url)
    }
}

impl MappingTable
{
    /// Creates an empty table.
    pub fn new() -> Self
    {
        Default::default()
    }

    /// Adds a mapping to the end of the table and returns its new id.
    ///
    /// The type isn't checked against any schema. A mapping to a type that doesn't exist fails
    /// at decode time.
    pub fn add(
        &self,
        url_pattern: &str,
        message_type: &str,
        direction: MappingDirection,
        description: &str,
    ) -> String
    {
        let id = uuid::Uuid::new_v4().to_string();
        self.mappings.write().push(Mapping {
            id: id.clone(),
            url_pattern: url_pattern.to_string(),
            message_type: message_type.to_string(),
            direction,
            description: description.to_string(),
        });

        info!(
            "Added mapping {}: {} ({:?}) -> {}",
            id, url_pattern, direction, message_type
        );
        id
    }

    /// Replaces a mapping in place, keeping its position in the table.
    pub fn update(
        &self,
        id: &str,
        url_pattern: &str,
        message_type: &str,
        direction: MappingDirection,
        description: &str,
    ) -> Result<(), MappingError>
    {
        let mut mappings = self.mappings.write();
        let mapping = mappings
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| MappingError::NotFound { id: id.to_string() })?;

        mapping.url_pattern = url_pattern.to_string();
        mapping.message_type = message_type.to_string();
        mapping.direction = direction;
        mapping.description = description.to_string();

        info!("Updated mapping {}", id);
        Ok(())
    }

    /// Removes a mapping.
    pub fn remove(&self, id: &str) -> Result<(), MappingError>
    {
        let mut mappings = self.mappings.write();
        let idx = mappings
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| MappingError::NotFound { id: id.to_string() })?;

        mappings.remove(idx);
        info!("Removed mapping {}", id);
        Ok(())
    }

    /// Gets a mapping by id.
    pub fn get(&self, id: &str) -> Option<Mapping>
    {
        self.mappings.read().iter().find(|m| m.id == id).cloned()
    }

    /// Snapshot of all mappings in creation order.
    pub fn list(&self) -> Vec<Mapping>
    {
        self.mappings.read().clone()
    }

    /// Message type of the first mapping that applies to the URL and direction.
    pub fn find_message_for_url(&self, url: &str, direction: Direction) -> Option<String>
    {
        let mappings = self.mappings.read();
        let found = mappings.iter().find(|m| m.matches(url, direction));

        match found {
            Some(m) => {
                debug!("{} {} matched mapping {}", direction, url, m.id);
                Some(m.message_type.clone())
            }
            None => None,
        }
    }
}

/// Matches text against a glob pattern where `*` matches any run of characters.
///
/// The pattern must match the whole text. There are no other wildcards or escapes and the
/// comparison is case sensitive.
pub fn glob_match(pattern: &str, text: &str) -> bool
{
    let (pattern, text) = (pattern.as_bytes(), text.as_bytes());
    let (mut p, mut t) = (0, 0);

    // Position of the last star in the pattern and the text position it's matched up to.
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some(b'*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(c) if *c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    t = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|c| *c == b'*')
}

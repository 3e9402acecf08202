//! Native carrier types exchanged with plugins.
//!
//! This module is the host-side counterpart of the wire messages: bodies,
//! opaque matching-rule and generator descriptions, plugin configuration,
//! configured interaction contents, mismatches, and the verification and
//! mock-server value types. Rule and generator *evaluation* belongs to the
//! host's matching engine, an external collaborator; here the descriptions
//! are only carried between their wire and native forms.

use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Display, Formatter};

use bytes::Bytes;
use serde_json::Value;

use crate::error::PluginError;

/// A MIME content type.
///
/// Only the little structure this host needs is modelled: the full type
/// string and its base form with parameters stripped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentType(String);

impl ContentType {
    /// Wraps a content type string.
    #[must_use]
    pub fn new(content_type: impl Into<String>) -> Self {
        Self(content_type.into())
    }

    /// The full content type string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The base type with any parameters stripped
    /// (`application/json; charset=utf-8` → `application/json`).
    #[must_use]
    pub fn base_type(&self) -> &str {
        self.0.split(';').next().unwrap_or_default().trim()
    }
}

impl Display for ContentType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Hint on how body content should be treated when the content type alone is
/// not decisive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContentTypeHint {
    /// Apply the implementation's default rules.
    #[default]
    Default,
    /// Always treat the content as text.
    Text,
    /// Always treat the content as binary.
    Binary,
}

/// A request, response or message body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Body {
    /// The content bytes. `None` means no body.
    pub content: Option<Bytes>,
    /// Content type of the body, when known.
    pub content_type: Option<ContentType>,
    /// How the content should be treated.
    pub content_type_hint: ContentTypeHint,
}

impl Body {
    /// Builds a body from bytes and a content type.
    #[must_use]
    pub fn new(content: impl Into<Bytes>, content_type: Option<ContentType>) -> Self {
        Self { content: Some(content.into()), content_type, content_type_hint: ContentTypeHint::Default }
    }

    /// Builds an empty body.
    #[must_use]
    pub const fn empty() -> Self {
        Self { content: None, content_type: None, content_type_hint: ContentTypeHint::Default }
    }

    /// Sets the content type hint.
    #[must_use]
    pub const fn with_hint(mut self, hint: ContentTypeHint) -> Self {
        self.content_type_hint = hint;
        self
    }

    /// The content bytes, or an empty slice when there is no body.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        self.content.as_deref().unwrap_or_default()
    }

    /// The content type string, or an empty string when unknown.
    #[must_use]
    pub fn content_type_str(&self) -> &str {
        self.content_type.as_ref().map(ContentType::as_str).unwrap_or_default()
    }
}

/// An opaque matching rule description: a rule type plus free-form
/// attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchingRuleDescriptor {
    /// Rule type name (for instance `regex` or `each-value`).
    pub rule_type: String,
    /// Attributes of the rule.
    pub values: Value,
}

/// A group of matching rules applying at one path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchingRuleGroup {
    /// The rules of the group.
    pub rules: Vec<MatchingRuleDescriptor>,
}

/// Matching rules for one category (`body` or `metadata`), keyed by path
/// expression.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchingRuleCategory {
    /// Category name.
    pub name: String,
    /// Rule groups keyed by path expression.
    pub rules: BTreeMap<String, MatchingRuleGroup>,
}

/// An opaque generator description: a generator type plus free-form
/// attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorDescriptor {
    /// Generator type name.
    pub generator_type: String,
    /// Attributes of the generator.
    pub values: Value,
}

/// Category a generator applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeneratorCategory {
    /// Generators for the body.
    Body,
    /// Generators for message metadata.
    Metadata,
}

/// A set of generators keyed by category and path expression.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Generators {
    /// Generators per category.
    pub categories: HashMap<GeneratorCategory, BTreeMap<String, GeneratorDescriptor>>,
}

impl Generators {
    /// Whether no generators are present in any category.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

/// Mode the test framework is running in when content is generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorTestMode {
    /// Running on the consumer side.
    Consumer,
    /// Running on the provider side.
    Provider,
}

/// Plugin-private configuration threaded through an interaction's lifecycle.
///
/// The pact-scoped map is shared and merged across every interaction in the
/// same contract document; the interaction-scoped map is private to one
/// interaction. When the document-level configuration is copied into an
/// interaction, later writes win per key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginConfiguration {
    /// Configuration scoped to one interaction.
    pub interaction_configuration: HashMap<String, Value>,
    /// Configuration scoped to the whole contract document.
    pub pact_configuration: HashMap<String, Value>,
}

impl PluginConfiguration {
    /// Whether both maps are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interaction_configuration.is_empty() && self.pact_configuration.is_empty()
    }
}

/// One configured part of an interaction returned by a plugin.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InteractionContents {
    /// The part the contents are for (like `request` or `response`). Empty
    /// when there is only one part.
    pub part_name: String,
    /// Body for the contents.
    pub body: Body,
    /// Matching rules for the body.
    pub rules: Option<MatchingRuleCategory>,
    /// Generators to apply.
    pub generators: Option<Generators>,
    /// Metadata for the contents (message interactions only).
    pub metadata: Option<HashMap<String, Value>>,
    /// Matching rules for the metadata.
    pub metadata_rules: Option<MatchingRuleCategory>,
    /// Plugin-private data to store with the interaction.
    pub plugin_config: PluginConfiguration,
    /// Markup to display the interaction in user interfaces.
    pub interaction_markup: String,
    /// Type of the markup (`COMMON_MARK` or `HTML`).
    pub interaction_markup_type: String,
}

impl Default for MatchingRuleCategory {
    fn default() -> Self {
        Self { name: "body".to_owned(), rules: BTreeMap::new() }
    }
}

/// A mismatch reported for a piece of content. Equality compares the byte
/// contents, not references.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentMismatch {
    /// Expected value bytes.
    pub expected: Option<Bytes>,
    /// Actual value bytes.
    pub actual: Option<Bytes>,
    /// Description of the mismatch.
    pub mismatch: String,
    /// Path to the mismatched item.
    pub path: String,
    /// Optional diff of the expected and actual values.
    pub diff: Option<String>,
    /// Optional type tag of the mismatch.
    pub mismatch_type: Option<String>,
}

/// A per-pact plugin configuration blob as stored in a contract document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginData {
    /// Plugin name.
    pub name: String,
    /// Plugin version.
    pub version: String,
    /// Configuration stored by the plugin.
    pub configuration: HashMap<String, Value>,
}

/// A metadata value attached to a verification request: either a JSON-like
/// value or raw binary data. The two shapes are preserved distinctly.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    /// A JSON-like value.
    Json(Value),
    /// Raw bytes.
    Binary(Bytes),
}

/// Configuration for starting a mock server.
#[derive(Debug, Clone, Default)]
pub struct MockServerConfig {
    /// Host interface to bind to. Defaults to the loopback adapter.
    pub host_interface: Option<String>,
    /// Port to bind to. Zero asks the OS for a random free port.
    pub port: u32,
    /// Whether TLS should be used (if the mock server supports it).
    pub tls: bool,
}

/// Results for one request a mock server received.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MockServerResults {
    /// Service and method that was requested.
    pub path: String,
    /// Error raised while handling the request, if any.
    pub error: String,
    /// Mismatches for the request.
    pub mismatches: Vec<ContentMismatch>,
}

/// Data required to execute the verification of an interaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InteractionVerificationData {
    /// Body of the request to be made.
    pub request_body: Body,
    /// Metadata associated with the request.
    pub metadata: HashMap<String, MetadataValue>,
}

/// Details of one verification failure.
#[derive(Debug, Clone, PartialEq)]
pub enum InteractionVerificationDetails {
    /// A plain error message.
    Error(String),
    /// A structured mismatch.
    Mismatch {
        /// Expected value bytes.
        expected: Bytes,
        /// Actual value bytes.
        actual: Bytes,
        /// Description of the mismatch.
        mismatch: String,
        /// Path to the mismatched item.
        path: String,
    },
}

/// Result of running the verification of an interaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InteractionVerificationResult {
    /// Whether the verification succeeded.
    pub ok: bool,
    /// Failure details when not successful.
    pub details: Vec<InteractionVerificationDetails>,
    /// Output lines the transport plugin wants surfaced to the user.
    pub output: Vec<String>,
}

/// Request to compare actual contents against expected contents.
#[derive(Debug, Clone, Default)]
pub struct ContentComparisonRequest {
    /// Expected body.
    pub expected: Body,
    /// Actual body.
    pub actual: Body,
    /// Whether unexpected keys are allowed in the actual body.
    pub allow_unexpected_keys: bool,
    /// Matching rule groups keyed by path expression.
    pub rules: HashMap<String, MatchingRuleGroup>,
    /// Plugin configuration keyed by plugin name. Only the entry for the
    /// matcher's own plugin is forwarded.
    pub plugin_configuration: HashMap<String, PluginConfiguration>,
}

/// Request to generate contents for a body.
#[derive(Debug, Clone)]
pub struct ContentGenerationRequest {
    /// Target content type.
    pub content_type: ContentType,
    /// The body to transform.
    pub body: Body,
    /// Generators keyed by path expression.
    pub generators: HashMap<String, GeneratorDescriptor>,
    /// Whether generation runs in a consumer test or provider verification.
    pub test_mode: GeneratorTestMode,
    /// Whether the content is for the request or the response part.
    pub for_request: bool,
    /// Per-pact plugin configuration blobs already known from the document.
    pub plugin_data: Vec<PluginData>,
    /// Per-interaction plugin configuration keyed by plugin name.
    pub interaction_data: HashMap<String, HashMap<String, Value>>,
    /// Context data provided by the test framework.
    pub test_context: HashMap<String, Value>,
}

/// The opaque contract-document collaborator.
///
/// The driver never interprets the document; it only needs the canonical
/// JSON text to forward to transport plugins and mock servers.
pub trait PactSource: Send + Sync {
    /// Renders the document to its canonical JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Document`] when the document cannot be
    /// serialised.
    fn to_canonical_json(&self) -> Result<String, PluginError>;
}

impl PactSource for String {
    fn to_canonical_json(&self) -> Result<String, PluginError> {
        Ok(self.clone())
    }
}

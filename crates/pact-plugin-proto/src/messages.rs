//! Message definitions for the plugin protocol.
//!
//! These mirror `plugin.proto` from the plugin interface definition. They are
//! maintained by hand (as the upstream drivers do with checked-in generated
//! code) so that building the workspace does not require `protoc`. The field
//! numbers are the wire contract: adding fields is safe, renumbering is not.
//!
//! Enumerations carry `from_wire` constructors implementing the protocol's
//! permissive decoding rules: values the host does not recognise degrade to
//! the enum's default rather than failing the surrounding operation.

use std::collections::HashMap;

/// First request sent after the gRPC channel is established; verifies the
/// plugin loaded OK and identifies the host implementation.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InitPluginRequest {
    /// Name of the implementation calling the plugin.
    #[prost(string, tag = "1")]
    pub implementation: String,
    /// Version of the implementation.
    #[prost(string, tag = "2")]
    pub version: String,
}

/// One capability a plugin provides. Entries land in the host catalogue under
/// the key `plugin/{name}/{type}/{key}`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CatalogueEntry {
    /// Entry type.
    #[prost(enumeration = "EntryType", tag = "1")]
    pub r#type: i32,
    /// Entry key.
    #[prost(string, tag = "2")]
    pub key: String,
    /// Associated data for the entry. `CONTENT_MATCHER` and
    /// `CONTENT_GENERATOR` entries must carry a `content-types` value listing
    /// the supported content types separated by semi-colons.
    #[prost(map = "string, string", tag = "3")]
    pub values: HashMap<String, String>,
}

/// Type of a catalogue entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum EntryType {
    /// Matcher for the contents of messages, requests or response bodies.
    ContentMatcher = 0,
    /// Generator for the contents of messages, requests or response bodies.
    ContentGenerator = 1,
    /// Transport for a network protocol (mock servers and verifiers).
    Transport = 2,
    /// Matching rule for content fields/values.
    Matcher = 3,
    /// Type of interaction.
    Interaction = 4,
}

impl EntryType {
    /// Decodes a wire value. Unrecognised values degrade to
    /// [`EntryType::ContentMatcher`].
    #[must_use]
    pub const fn from_wire(value: i32) -> Self {
        match value {
            1 => Self::ContentGenerator,
            2 => Self::Transport,
            3 => Self::Matcher,
            4 => Self::Interaction,
            _ => Self::ContentMatcher,
        }
    }
}

/// Response to [`InitPluginRequest`] listing the entries the plugin provides.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InitPluginResponse {
    /// Catalogue entries the plugin supports.
    #[prost(message, repeated, tag = "1")]
    pub catalogue: Vec<CatalogueEntry>,
}

/// The merged catalogue of core and plugin capabilities, pushed to every
/// loaded plugin whenever it changes.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Catalogue {
    /// All current entries.
    #[prost(message, repeated, tag = "1")]
    pub catalogue: Vec<CatalogueEntry>,
}

/// A request, response or message body.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Body {
    /// Content type in MIME format (i.e. `application/json`).
    #[prost(string, tag = "1")]
    pub content_type: String,
    /// Raw bytes of the content.
    #[prost(message, optional, tag = "2")]
    pub content: Option<Vec<u8>>,
    /// Override on how the content should be treated. When omitted the
    /// receiver applies its default rules.
    #[prost(enumeration = "ContentTypeHint", tag = "3")]
    pub content_type_hint: i32,
}

/// Hint on how body content should be treated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ContentTypeHint {
    /// Determine the form of the content from the implementation's defaults.
    Default = 0,
    /// Always treat the contents as text.
    Text = 1,
    /// Always treat the contents as binary.
    Binary = 2,
}

impl ContentTypeHint {
    /// Decodes a wire value. Unrecognised values degrade to
    /// [`ContentTypeHint::Default`].
    #[must_use]
    pub const fn from_wire(value: i32) -> Self {
        match value {
            1 => Self::Text,
            2 => Self::Binary,
            _ => Self::Default,
        }
    }
}

/// Request to compare an actual body against the expected one.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CompareContentsRequest {
    /// Expected body from the interaction.
    #[prost(message, optional, tag = "1")]
    pub expected: Option<Body>,
    /// Actual received body.
    #[prost(message, optional, tag = "2")]
    pub actual: Option<Body>,
    /// Whether unexpected keys/fields are allowed. When false, additional
    /// keys in the actual body are mismatches.
    #[prost(bool, tag = "3")]
    pub allow_unexpected_keys: bool,
    /// Matching rules keyed by matching rule expression.
    #[prost(map = "string, message", tag = "4")]
    pub rules: HashMap<String, MatchingRules>,
    /// Data added to the pact/interaction by the plugin.
    #[prost(message, optional, tag = "5")]
    pub plugin_configuration: Option<PluginConfiguration>,
}

/// Mismatch of the content types themselves.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ContentTypeMismatch {
    /// Expected content type (MIME format).
    #[prost(string, tag = "1")]
    pub expected: String,
    /// Actual content type received (MIME format).
    #[prost(string, tag = "2")]
    pub actual: String,
}

/// A single content mismatch.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ContentMismatch {
    /// Expected data bytes.
    #[prost(message, optional, tag = "1")]
    pub expected: Option<Vec<u8>>,
    /// Actual data bytes.
    #[prost(message, optional, tag = "2")]
    pub actual: Option<Vec<u8>>,
    /// Description of the mismatch.
    #[prost(string, tag = "3")]
    pub mismatch: String,
    /// Path to the mismatched item, as a matching rule expression.
    #[prost(string, tag = "4")]
    pub path: String,
    /// Optional diff of the contents.
    #[prost(string, tag = "5")]
    pub diff: String,
    /// Type of the mismatch.
    #[prost(string, tag = "6")]
    pub mismatch_type: String,
}

/// List of content mismatches.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ContentMismatches {
    /// The mismatches.
    #[prost(message, repeated, tag = "1")]
    pub mismatches: Vec<ContentMismatch>,
}

/// Results of a contents comparison.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CompareContentsResponse {
    /// Error message if the comparison itself failed. When set the remaining
    /// fields are ignored and the verification is marked failed.
    #[prost(string, tag = "1")]
    pub error: String,
    /// Set when the content types themselves did not match.
    #[prost(message, optional, tag = "2")]
    pub type_mismatch: Option<ContentTypeMismatch>,
    /// Match results keyed by matching rule expression.
    #[prost(map = "string, message", tag = "3")]
    pub results: HashMap<String, ContentMismatches>,
}

/// Request to configure an interaction from the user-supplied definition.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConfigureInteractionRequest {
    /// Content type of the interaction (MIME format).
    #[prost(string, tag = "1")]
    pub content_type: String,
    /// Data specified by the user in the consumer test.
    #[prost(message, optional, tag = "2")]
    pub contents_config: Option<::prost_types::Struct>,
}

/// A matching rule description.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MatchingRule {
    /// Type of the matching rule.
    #[prost(string, tag = "1")]
    pub r#type: String,
    /// Associated data for the rule.
    #[prost(message, optional, tag = "2")]
    pub values: Option<::prost_types::Struct>,
}

/// List of matching rules.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MatchingRules {
    /// The rules.
    #[prost(message, repeated, tag = "1")]
    pub rule: Vec<MatchingRule>,
}

/// An example generator description.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Generator {
    /// Type of generator.
    #[prost(string, tag = "1")]
    pub r#type: String,
    /// Associated data for the generator.
    #[prost(message, optional, tag = "2")]
    pub values: Option<::prost_types::Struct>,
}

/// Plugin-private configuration persisted in the pact file by the
/// configure-interaction step.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PluginConfiguration {
    /// Data persisted against the interaction.
    #[prost(message, optional, tag = "1")]
    pub interaction_configuration: Option<::prost_types::Struct>,
    /// Data persisted in the pact file metadata (shared across interactions).
    #[prost(message, optional, tag = "2")]
    pub pact_configuration: Option<::prost_types::Struct>,
}

/// One configured part of an interaction.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InteractionResponse {
    /// Contents for the interaction.
    #[prost(message, optional, tag = "1")]
    pub contents: Option<Body>,
    /// Matching rules to apply to the body.
    #[prost(map = "string, message", tag = "2")]
    pub rules: HashMap<String, MatchingRules>,
    /// Generators to apply to the body.
    #[prost(map = "string, message", tag = "3")]
    pub generators: HashMap<String, Generator>,
    /// Metadata to apply (message interactions only).
    #[prost(message, optional, tag = "4")]
    pub message_metadata: Option<::prost_types::Struct>,
    /// Plugin-private data to persist in the pact file.
    #[prost(message, optional, tag = "5")]
    pub plugin_configuration: Option<PluginConfiguration>,
    /// Markdown/HTML text representation of the interaction for UI display.
    #[prost(string, tag = "6")]
    pub interaction_markup: String,
    /// Format of `interaction_markup`.
    #[prost(enumeration = "MarkupType", tag = "7")]
    pub interaction_markup_type: i32,
    /// Which part this entry is for when more than one is returned (for
    /// instance `request` and `response`).
    #[prost(string, tag = "8")]
    pub part_name: String,
    /// Matching rules to apply to message metadata.
    #[prost(map = "string, message", tag = "9")]
    pub metadata_rules: HashMap<String, MatchingRules>,
    /// Generators to apply to message metadata.
    #[prost(map = "string, message", tag = "10")]
    pub metadata_generators: HashMap<String, Generator>,
}

/// Markup format used for interaction display text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum MarkupType {
    /// CommonMark format.
    CommonMark = 0,
    /// HTML format.
    Html = 1,
}

impl MarkupType {
    /// Decodes a wire value. Unrecognised values degrade to
    /// [`MarkupType::CommonMark`].
    #[must_use]
    pub const fn from_wire(value: i32) -> Self {
        match value {
            1 => Self::Html,
            _ => Self::CommonMark,
        }
    }

    /// Canonical string form as stored in contract documents.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CommonMark => "COMMON_MARK",
            Self::Html => "HTML",
        }
    }
}

/// Response to [`ConfigureInteractionRequest`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConfigureInteractionResponse {
    /// Error message if configuration failed. When set the other fields are
    /// not populated.
    #[prost(string, tag = "1")]
    pub error: String,
    /// The configured interaction parts.
    #[prost(message, repeated, tag = "2")]
    pub interaction: Vec<InteractionResponse>,
    /// Plugin-private data to persist in the pact file, shared by all the
    /// returned parts.
    #[prost(message, optional, tag = "3")]
    pub plugin_configuration: Option<PluginConfiguration>,
}

/// Request to generate contents by applying the defined generators.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GenerateContentRequest {
    /// Original contents.
    #[prost(message, optional, tag = "1")]
    pub contents: Option<Body>,
    /// Generators to apply.
    #[prost(map = "string, message", tag = "2")]
    pub generators: HashMap<String, Generator>,
    /// Data added to the pact/interaction by the plugin.
    #[prost(message, optional, tag = "3")]
    pub plugin_configuration: Option<PluginConfiguration>,
    /// Context data provided by the test framework.
    #[prost(message, optional, tag = "4")]
    pub test_context: Option<::prost_types::Struct>,
    /// Whether generation runs in a consumer test or provider verification.
    #[prost(enumeration = "TestMode", tag = "5")]
    pub test_mode: i32,
    /// Which part of the interaction the content is for.
    #[prost(enumeration = "ContentFor", tag = "6")]
    pub content_for: i32,
}

/// Mode the test framework is running in during content generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum TestMode {
    /// Mode was not specified.
    Unknown = 0,
    /// Running on the consumer side.
    Consumer = 1,
    /// Running on the provider side.
    Provider = 2,
}

/// Which part of an interaction generated content is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ContentFor {
    /// The request part.
    Request = 0,
    /// The response part.
    Response = 1,
}

/// Generated body/message contents.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GenerateContentResponse {
    /// The generated contents.
    #[prost(message, optional, tag = "1")]
    pub contents: Option<Body>,
}

/// Request to start a mock server for the given pact.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StartMockServerRequest {
    /// Interface to bind to. Defaults to the loopback adapter when empty.
    #[prost(string, tag = "1")]
    pub host_interface: String,
    /// Port to bind to. Zero asks the OS for a random free port.
    #[prost(uint32, tag = "2")]
    pub port: u32,
    /// Whether TLS should be used (if the mock server supports it).
    #[prost(bool, tag = "3")]
    pub tls: bool,
    /// Pact as JSON text driving the mock server behaviour.
    #[prost(string, tag = "4")]
    pub pact: String,
    /// Context data provided by the test framework.
    #[prost(message, optional, tag = "5")]
    pub test_context: Option<::prost_types::Struct>,
}

/// Response to [`StartMockServerRequest`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StartMockServerResponse {
    /// Either an error or the running server's details.
    #[prost(oneof = "StartMockServerOutcome", tags = "1, 2")]
    pub response: Option<StartMockServerOutcome>,
}

/// Outcome of a mock server start.
#[derive(Clone, PartialEq, ::prost::Oneof)]
pub enum StartMockServerOutcome {
    /// The server could not be started.
    #[prost(string, tag = "1")]
    Error(String),
    /// The server started; its details.
    #[prost(message, tag = "2")]
    Details(MockServerDetails),
}

/// Details of a running mock server.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MockServerDetails {
    /// Unique ID of the server, used for later requests about it.
    #[prost(string, tag = "1")]
    pub key: String,
    /// Port the server is bound to.
    #[prost(uint32, tag = "2")]
    pub port: u32,
    /// Address the server is bound to.
    #[prost(string, tag = "3")]
    pub address: String,
}

/// Request to shut a running mock server down.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ShutdownMockServerRequest {
    /// ID of the server to shut down.
    #[prost(string, tag = "1")]
    pub server_key: String,
}

/// Request about a running mock server by ID.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MockServerRequest {
    /// ID of the server.
    #[prost(string, tag = "1")]
    pub server_key: String,
}

/// Result for one request a mock server received.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MockServerResult {
    /// Service and method that was requested.
    #[prost(string, tag = "1")]
    pub path: String,
    /// Error raised while handling the request, if any.
    #[prost(string, tag = "2")]
    pub error: String,
    /// Content mismatches for the request.
    #[prost(message, repeated, tag = "3")]
    pub mismatches: Vec<ContentMismatch>,
}

/// Response to [`ShutdownMockServerRequest`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ShutdownMockServerResponse {
    /// True when every received request matched.
    #[prost(bool, tag = "1")]
    pub ok: bool,
    /// One entry per request the server received, when not ok.
    #[prost(message, repeated, tag = "2")]
    pub results: Vec<MockServerResult>,
}

/// Matching results of a running mock server.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MockServerResults {
    /// True when every received request matched.
    #[prost(bool, tag = "1")]
    pub ok: bool,
    /// One entry per request the server received, when not ok.
    #[prost(message, repeated, tag = "2")]
    pub results: Vec<MockServerResult>,
}

/// Request to prepare an interaction for verification.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VerificationPreparationRequest {
    /// Pact as JSON text.
    #[prost(string, tag = "1")]
    pub pact: String,
    /// Unique key of the interaction being verified.
    #[prost(string, tag = "2")]
    pub interaction_key: String,
    /// User-supplied verification configuration.
    #[prost(message, optional, tag = "3")]
    pub config: Option<::prost_types::Struct>,
}

/// A metadata value: either a JSON-like value or raw binary data.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MetadataValue {
    /// The value.
    #[prost(oneof = "MetadataValueKind", tags = "1, 2")]
    pub value: Option<MetadataValueKind>,
}

/// The two shapes a metadata value can take.
#[derive(Clone, PartialEq, ::prost::Oneof)]
pub enum MetadataValueKind {
    /// A JSON-like value.
    #[prost(message, tag = "1")]
    NonBinaryValue(::prost_types::Value),
    /// Raw bytes.
    #[prost(bytes, tag = "2")]
    BinaryValue(Vec<u8>),
}

/// Interaction data to be sent or received during verification.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InteractionData {
    /// Request/response body.
    #[prost(message, optional, tag = "1")]
    pub body: Option<Body>,
    /// Metadata associated with the body.
    #[prost(map = "string, message", tag = "2")]
    pub metadata: HashMap<String, MetadataValue>,
}

/// Response to [`VerificationPreparationRequest`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VerificationPreparationResponse {
    /// Either an error or the data needed to build the request.
    #[prost(oneof = "VerificationPreparationOutcome", tags = "1, 2")]
    pub response: Option<VerificationPreparationOutcome>,
}

/// Outcome of preparing an interaction for verification.
#[derive(Clone, PartialEq, ::prost::Oneof)]
pub enum VerificationPreparationOutcome {
    /// Preparation failed.
    #[prost(string, tag = "1")]
    Error(String),
    /// Data required to construct the request.
    #[prost(message, tag = "2")]
    InteractionData(InteractionData),
}

/// Request to execute the verification of an interaction.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VerifyInteractionRequest {
    /// Data required to construct the request.
    #[prost(message, optional, tag = "1")]
    pub interaction_data: Option<InteractionData>,
    /// User-supplied verification configuration.
    #[prost(message, optional, tag = "2")]
    pub config: Option<::prost_types::Struct>,
    /// Pact as JSON text.
    #[prost(string, tag = "3")]
    pub pact: String,
    /// Unique key of the interaction being verified.
    #[prost(string, tag = "4")]
    pub interaction_key: String,
}

/// One item of a verification result.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VerificationResultItem {
    /// Either a plain error or a structured mismatch.
    #[prost(oneof = "VerificationResultItemKind", tags = "1, 2")]
    pub result: Option<VerificationResultItemKind>,
}

/// The two shapes a verification result item can take.
#[derive(Clone, PartialEq, ::prost::Oneof)]
pub enum VerificationResultItemKind {
    /// An error occurred.
    #[prost(string, tag = "1")]
    Error(String),
    /// A mismatch occurred.
    #[prost(message, tag = "2")]
    Mismatch(ContentMismatch),
}

/// Result of running a verification.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VerificationResult {
    /// Whether the verification succeeded.
    #[prost(bool, tag = "1")]
    pub success: bool,
    /// Interaction data retrieved from the provider (optional).
    #[prost(message, optional, tag = "2")]
    pub response_data: Option<InteractionData>,
    /// Mismatches that occurred.
    #[prost(message, repeated, tag = "3")]
    pub mismatches: Vec<VerificationResultItem>,
    /// Output lines for the verification to surface to the user.
    #[prost(string, repeated, tag = "4")]
    pub output: Vec<String>,
}

/// Response to [`VerifyInteractionRequest`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VerifyInteractionResponse {
    /// Either an error or the verification result.
    #[prost(oneof = "VerifyInteractionOutcome", tags = "1, 2")]
    pub response: Option<VerifyInteractionOutcome>,
}

/// Outcome of a verification run.
#[derive(Clone, PartialEq, ::prost::Oneof)]
pub enum VerifyInteractionOutcome {
    /// The verification could not be run.
    #[prost(string, tag = "1")]
    Error(String),
    /// The verification ran; its result.
    #[prost(message, tag = "2")]
    Result(VerificationResult),
}

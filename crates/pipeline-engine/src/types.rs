//! Core types for pipeline graphs
//!
//! These types define ports, the values that flow between them, the
//! preview ("info") form of those values, and the node model shared by
//! the document, the authoring checks and the scheduler.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;

use serde::{Deserialize, Serialize};

/// Unique identifier for a node
pub type NodeId = String;

/// Unique identifier for a connection
pub type ConnectionId = String;

/// Identifier for a port, unique within its node
pub type PortId = String;

/// Unique identifier for an execution run
pub type RunId = String;

/// The data type of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDataType {
    /// Image reference (URL or data URL)
    Image,
    /// Text string
    Text,
    /// Model identifier (`provider:model`)
    Model,
    /// Numeric value
    Number,
    /// Latent tensor reference
    Latent,
    /// Accepts any type
    Any,
}

impl PortDataType {
    /// Check if this type can connect to another type
    pub fn is_compatible_with(&self, other: &PortDataType) -> bool {
        if matches!(self, PortDataType::Any) || matches!(other, PortDataType::Any) {
            return true;
        }
        self == other
    }
}

/// Which end of a connection a binding pins
///
/// `Start` is the producing (output) side, `End` the consuming (input) side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Terminal {
    Start,
    End,
}

impl Terminal {
    /// The other end of the connection
    pub fn opposite(self) -> Self {
        match self {
            Terminal::Start => Terminal::End,
            Terminal::End => Terminal::Start,
        }
    }
}

/// Definition of a port (input or output)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortDefinition {
    /// Identifier of this port within its node
    pub id: PortId,
    /// Direction of the port
    pub terminal: Terminal,
    /// Data type of the port
    pub data_type: PortDataType,
    /// Whether this input accepts several connections
    #[serde(default)]
    pub multi: bool,
}

impl PortDefinition {
    /// Create an input (`end`) port
    pub fn input(id: impl Into<String>, data_type: PortDataType) -> Self {
        Self {
            id: id.into(),
            terminal: Terminal::End,
            data_type,
            multi: false,
        }
    }

    /// Create an output (`start`) port
    pub fn output(id: impl Into<String>, data_type: PortDataType) -> Self {
        Self {
            id: id.into(),
            terminal: Terminal::Start,
            data_type,
            multi: false,
        }
    }

    /// Set this port to accept multiple connections
    pub fn multi(mut self) -> Self {
        self.multi = true;
        self
    }
}

/// Ports of a node, keyed and ordered by port id
pub type PortMap = BTreeMap<PortId, PortDefinition>;

/// Collect port definitions into a [`PortMap`]
pub fn port_map(ports: impl IntoIterator<Item = PortDefinition>) -> PortMap {
    ports.into_iter().map(|p| (p.id.clone(), p)).collect()
}

/// A value flowing along a connection
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PipelineValue {
    #[default]
    Null,
    Number(f64),
    Text(String),
}

impl PipelineValue {
    pub fn is_null(&self) -> bool {
        matches!(self, PipelineValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PipelineValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            PipelineValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Coerce to text; numbers render without a trailing `.0`
    pub fn to_text(&self) -> Option<String> {
        match self {
            PipelineValue::Null => None,
            PipelineValue::Text(s) => Some(s.clone()),
            PipelineValue::Number(n) => Some(format_number(*n)),
        }
    }

    /// Coerce to a number, parsing text when needed
    pub fn to_number(&self) -> Option<f64> {
        match self {
            PipelineValue::Null => None,
            PipelineValue::Number(n) => Some(*n),
            PipelineValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl From<&str> for PipelineValue {
    fn from(value: &str) -> Self {
        PipelineValue::Text(value.to_string())
    }
}

impl From<String> for PipelineValue {
    fn from(value: String) -> Self {
        PipelineValue::Text(value)
    }
}

impl From<f64> for PipelineValue {
    fn from(value: f64) -> Self {
        PipelineValue::Number(value)
    }
}

impl From<Option<String>> for PipelineValue {
    fn from(value: Option<String>) -> Self {
        value.map(PipelineValue::Text).unwrap_or_default()
    }
}

/// A value produced by a node operation on one output port
///
/// `Stop` tells the scheduler that downstream consumers must not run.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputValue {
    Value(PipelineValue),
    Stop,
}

impl OutputValue {
    pub fn null() -> Self {
        OutputValue::Value(PipelineValue::Null)
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, OutputValue::Stop)
    }

    /// The carried value, or `None` for `Stop`
    pub fn value(&self) -> Option<&PipelineValue> {
        match self {
            OutputValue::Value(v) => Some(v),
            OutputValue::Stop => None,
        }
    }
}

impl From<PipelineValue> for OutputValue {
    fn from(value: PipelineValue) -> Self {
        OutputValue::Value(value)
    }
}

impl From<&str> for OutputValue {
    fn from(value: &str) -> Self {
        OutputValue::Value(value.into())
    }
}

impl From<String> for OutputValue {
    fn from(value: String) -> Self {
        OutputValue::Value(value.into())
    }
}

impl From<f64> for OutputValue {
    fn from(value: f64) -> Self {
        OutputValue::Value(value.into())
    }
}

impl From<Option<String>> for OutputValue {
    fn from(value: Option<String>) -> Self {
        OutputValue::Value(value.into())
    }
}

/// Outputs of one node execution, keyed by output port id
pub type ExecutionResult = HashMap<PortId, OutputValue>;

/// Build an [`ExecutionResult`] from `(port, value)` pairs
pub fn outputs<const N: usize>(entries: [(&str, OutputValue); N]) -> ExecutionResult {
    entries
        .into_iter()
        .map(|(port, value)| (port.to_string(), value))
        .collect()
}

/// A resolved input: a single value, or an ordered list for multi ports
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InputValue {
    Single(PipelineValue),
    Multi(Vec<PipelineValue>),
}

/// Inputs handed to a node operation, keyed by input port id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputValues {
    values: HashMap<PortId, InputValue>,
}

impl InputValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a single value on a port (builder style)
    pub fn with(mut self, port: impl Into<String>, value: impl Into<PipelineValue>) -> Self {
        self.values
            .insert(port.into(), InputValue::Single(value.into()));
        self
    }

    /// Set an ordered list on a port (builder style)
    pub fn with_multi(mut self, port: impl Into<String>, values: Vec<PipelineValue>) -> Self {
        self.values.insert(port.into(), InputValue::Multi(values));
        self
    }

    /// Add a resolved value. Multi ports append, single ports overwrite.
    pub(crate) fn accumulate(&mut self, port: &str, value: PipelineValue, multi: bool) {
        if !multi {
            self.values
                .insert(port.to_string(), InputValue::Single(value));
            return;
        }
        match self.values.get_mut(port) {
            Some(InputValue::Multi(list)) => list.push(value),
            _ => {
                self.values
                    .insert(port.to_string(), InputValue::Multi(vec![value]));
            }
        }
    }

    pub fn get(&self, port: &str) -> Option<&InputValue> {
        self.values.get(port)
    }

    /// The value on a port; for a list, its first element
    pub fn get_input(&self, port: &str) -> Option<&PipelineValue> {
        match self.values.get(port)? {
            InputValue::Single(v) => Some(v),
            InputValue::Multi(list) => list.first(),
        }
    }

    /// All values on a port as a list
    pub fn get_input_multi(&self, port: &str) -> Vec<PipelineValue> {
        match self.values.get(port) {
            Some(InputValue::Single(v)) => vec![v.clone()],
            Some(InputValue::Multi(list)) => list.clone(),
            None => Vec::new(),
        }
    }

    /// The input coerced to text, `None` when missing, null or empty
    pub fn get_text(&self, port: &str) -> Option<String> {
        self.get_input(port)
            .and_then(PipelineValue::to_text)
            .filter(|s| !s.is_empty())
    }

    /// The input coerced to a number
    pub fn get_number(&self, port: &str) -> Option<f64> {
        self.get_input(port).and_then(PipelineValue::to_number)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PortId, &InputValue)> {
        self.values.iter()
    }
}

/// The value part of an [`InfoValue`]
#[derive(Debug, Clone, PartialEq)]
pub enum InfoPayload {
    Single(OutputValue),
    Multi(Vec<OutputValue>),
}

/// Preview of the value on a port, computed without running anything
#[derive(Debug, Clone, PartialEq)]
pub struct InfoValue {
    pub payload: InfoPayload,
    /// True when the producer or anything upstream of it is stale
    pub is_out_of_date: bool,
    pub data_type: PortDataType,
}

impl InfoValue {
    /// A single-valued preview
    pub fn new(value: impl Into<OutputValue>, is_out_of_date: bool, data_type: PortDataType) -> Self {
        Self {
            payload: InfoPayload::Single(value.into()),
            is_out_of_date,
            data_type,
        }
    }

    /// A preview for a multi port
    pub fn multi(values: Vec<OutputValue>, is_out_of_date: bool, data_type: PortDataType) -> Self {
        Self {
            payload: InfoPayload::Multi(values),
            is_out_of_date,
            data_type,
        }
    }

    pub fn is_multi(&self) -> bool {
        matches!(self.payload, InfoPayload::Multi(_))
    }

    /// The single value, or the first element of a list
    pub fn first(&self) -> Option<&OutputValue> {
        match &self.payload {
            InfoPayload::Single(v) => Some(v),
            InfoPayload::Multi(list) => list.first(),
        }
    }

    /// The first value as text, skipping `Stop` and null
    pub fn text(&self) -> Option<&str> {
        self.first()
            .and_then(OutputValue::value)
            .and_then(PipelineValue::as_text)
    }
}

/// Port previews keyed by port id
pub type InfoValues = HashMap<PortId, InfoValue>;

/// True if any input preview is out of date
pub fn any_out_of_date(inputs: &InfoValues) -> bool {
    inputs.values().any(|info| info.is_out_of_date)
}

/// A closed set of node kinds
///
/// Implemented by the node enum of a pipeline; each variant carries its
/// own parameters. The tag selects the operation in the registry.
pub trait NodeKind: Clone + Debug + Send + Sync + 'static {
    /// Type tag used for registry lookup
    fn type_tag(&self) -> &'static str;
}

/// A node in the document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node<N> {
    pub id: NodeId,
    /// Node kind with its parameters
    pub kind: N,
    /// Run that currently has this node in flight, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_run: Option<RunId>,
}

impl<N: NodeKind> Node<N> {
    pub fn new(id: impl Into<String>, kind: N) -> Self {
        Self {
            id: id.into(),
            kind,
            stale_run: None,
        }
    }

    pub fn type_tag(&self) -> &'static str {
        self.kind.type_tag()
    }

    /// Whether a run is currently computing this node
    pub fn is_out_of_date(&self) -> bool {
        self.stale_run.is_some()
    }
}

//! Node kinds of the image pipeline and their parameters
//!
//! Each variant of [`PipelineNode`] carries the user-editable parameters of
//! one node type plus any "last result" fields written back by execution.
//! Missing fields deserialize to their defaults.

use pipeline_engine::{Node, NodeKind, PipelineError, Result};
use serde::{Deserialize, Serialize};

/// Upper bound (exclusive) for randomly chosen seeds
pub const MAX_RANDOM_SEED: u64 = 99_999;

/// A fresh random seed below [`MAX_RANDOM_SEED`]
pub fn random_seed() -> u64 {
    (uuid::Uuid::new_v4().as_u128() % u128::from(MAX_RANDOM_SEED)) as u64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelParams {
    pub provider: String,
    pub model_id: String,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            provider: "flux".to_string(),
            model_id: "flux-dev".to_string(),
        }
    }
}

impl ModelParams {
    /// `provider:modelId`, the form consumed by generation nodes
    pub fn qualified(&self) -> String {
        format!("{}:{}", self.provider, self.model_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PromptParams {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NumberParams {
    pub value: f64,
}

impl Default for NumberParams {
    fn default() -> Self {
        Self { value: 50.0 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoadImageParams {
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerateParams {
    pub steps: u32,
    pub cfg_scale: f64,
    pub seed: u64,
    pub last_result_url: Option<String>,
}

impl Default for GenerateParams {
    fn default() -> Self {
        Self {
            steps: 20,
            cfg_scale: 7.0,
            seed: random_seed(),
            last_result_url: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerateTextParams {
    pub last_result_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControlNetParams {
    /// `canny`, `depth`, `pose` or `segmentation`
    pub mode: String,
    /// Percent, `0..=100`
    pub strength: f64,
    pub steps: u32,
    pub last_result_url: Option<String>,
}

impl Default for ControlNetParams {
    fn default() -> Self {
        Self {
            mode: "canny".to_string(),
            strength: 75.0,
            steps: 20,
            last_result_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IpAdapterParams {
    /// Percent, `0..=100`
    pub scale: f64,
    pub steps: u32,
    pub last_result_url: Option<String>,
}

impl Default for IpAdapterParams {
    fn default() -> Self {
        Self {
            scale: 60.0,
            steps: 30,
            last_result_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StyleTransferParams {
    pub model: String,
    /// Percent, `0..=100`
    pub strength: f64,
    pub last_result_url: Option<String>,
}

impl Default for StyleTransferParams {
    fn default() -> Self {
        Self {
            model: "fast".to_string(),
            strength: 50.0,
            last_result_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpscaleParams {
    /// Scale factor as picked in the UI (`"2"` or `"4"`)
    pub scale: String,
    /// `bilinear`, `lanczos` or `ai_enhanced`
    pub method: String,
    pub last_result_url: Option<String>,
}

impl Default for UpscaleParams {
    fn default() -> Self {
        Self {
            scale: "2".to_string(),
            method: "lanczos".to_string(),
            last_result_url: None,
        }
    }
}

/// Colour adjustments, each in `-50..=50`; 0 leaves the image unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdjustParams {
    pub brightness: f64,
    pub contrast: f64,
    pub saturation: f64,
    pub last_result_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Difference,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BlendParams {
    pub mode: BlendMode,
    /// Opacity of the top image in percent
    pub opacity: f64,
    pub last_result_url: Option<String>,
}

impl Default for BlendParams {
    fn default() -> Self {
        Self {
            mode: BlendMode::Normal,
            opacity: 50.0,
            last_result_url: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Separator {
    #[default]
    Space,
    Newline,
    Comma,
    None,
}

impl Separator {
    pub fn as_str(self) -> &'static str {
        match self {
            Separator::Space => " ",
            Separator::Newline => "\n",
            Separator::Comma => ", ",
            Separator::None => "",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PromptConcatParams {
    pub separator: Separator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RouterParams {
    pub output_count: usize,
}

impl Default for RouterParams {
    fn default() -> Self {
        Self { output_count: 3 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IteratorParams {
    /// One item per line
    pub items: String,
    pub completed_count: usize,
    pub total_count: usize,
    pub last_result_url: Option<String>,
}

impl Default for IteratorParams {
    fn default() -> Self {
        Self {
            items: "cat\ndog\nbird".to_string(),
            completed_count: 0,
            total_count: 0,
            last_result_url: None,
        }
    }
}

impl IteratorParams {
    /// Trimmed, non-empty lines of `items`
    pub fn item_list(&self) -> Vec<&str> {
        self.items
            .lines()
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .collect()
    }

    /// The item most recently processed, if any
    pub fn current_item(&self) -> Option<&str> {
        if self.completed_count == 0 {
            return None;
        }
        let items = self.item_list();
        let last = items.len().checked_sub(1)?;
        items.get((self.completed_count - 1).min(last)).copied()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreviewParams {
    pub last_image_url: Option<String>,
}

/// Every built-in node kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineNode {
    Model(ModelParams),
    Prompt(PromptParams),
    Number(NumberParams),
    LoadImage(LoadImageParams),
    Generate(GenerateParams),
    GenerateText(GenerateTextParams),
    #[serde(rename = "controlnet")]
    ControlNet(ControlNetParams),
    IpAdapter(IpAdapterParams),
    StyleTransfer(StyleTransferParams),
    Upscale(UpscaleParams),
    Adjust(AdjustParams),
    Blend(BlendParams),
    PromptConcat(PromptConcatParams),
    Router(RouterParams),
    Iterator(IteratorParams),
    Preview(PreviewParams),
}

/// Parameters of exactly one [`PipelineNode`] variant
pub trait NodeParams: Default + Sized {
    /// Type tag of the variant carrying these parameters
    const NODE_TYPE: &'static str;

    fn from_kind(kind: &PipelineNode) -> Option<&Self>;

    fn from_kind_mut(kind: &mut PipelineNode) -> Option<&mut Self>;

    fn into_kind(self) -> PipelineNode;
}

macro_rules! node_params {
    ($($params:ty => $variant:ident, $tag:literal;)*) => {
        $(
            impl NodeParams for $params {
                const NODE_TYPE: &'static str = $tag;

                fn from_kind(kind: &PipelineNode) -> Option<&Self> {
                    match kind {
                        PipelineNode::$variant(params) => Some(params),
                        _ => None,
                    }
                }

                fn from_kind_mut(kind: &mut PipelineNode) -> Option<&mut Self> {
                    match kind {
                        PipelineNode::$variant(params) => Some(params),
                        _ => None,
                    }
                }

                fn into_kind(self) -> PipelineNode {
                    PipelineNode::$variant(self)
                }
            }
        )*

        impl NodeKind for PipelineNode {
            fn type_tag(&self) -> &'static str {
                match self {
                    $(PipelineNode::$variant(_) => $tag,)*
                }
            }
        }

        /// Type tags of every built-in node kind
        pub const NODE_TYPES: &[&str] = &[$($tag),*];
    };
}

node_params! {
    ModelParams => Model, "model";
    PromptParams => Prompt, "prompt";
    NumberParams => Number, "number";
    LoadImageParams => LoadImage, "load_image";
    GenerateParams => Generate, "generate";
    GenerateTextParams => GenerateText, "generate_text";
    ControlNetParams => ControlNet, "controlnet";
    IpAdapterParams => IpAdapter, "ip_adapter";
    StyleTransferParams => StyleTransfer, "style_transfer";
    UpscaleParams => Upscale, "upscale";
    AdjustParams => Adjust, "adjust";
    BlendParams => Blend, "blend";
    PromptConcatParams => PromptConcat, "prompt_concat";
    RouterParams => Router, "router";
    IteratorParams => Iterator, "iterator";
    PreviewParams => Preview, "preview";
}

impl PipelineNode {
    /// A node of the given type with default parameters
    pub fn default_for(node_type: &str) -> Option<Self> {
        let kind = match node_type {
            "model" => ModelParams::default().into_kind(),
            "prompt" => PromptParams::default().into_kind(),
            "number" => NumberParams::default().into_kind(),
            "load_image" => LoadImageParams::default().into_kind(),
            "generate" => GenerateParams::default().into_kind(),
            "generate_text" => GenerateTextParams::default().into_kind(),
            "controlnet" => ControlNetParams::default().into_kind(),
            "ip_adapter" => IpAdapterParams::default().into_kind(),
            "style_transfer" => StyleTransferParams::default().into_kind(),
            "upscale" => UpscaleParams::default().into_kind(),
            "adjust" => AdjustParams::default().into_kind(),
            "blend" => BlendParams::default().into_kind(),
            "prompt_concat" => PromptConcatParams::default().into_kind(),
            "router" => RouterParams::default().into_kind(),
            "iterator" => IteratorParams::default().into_kind(),
            "preview" => PreviewParams::default().into_kind(),
            _ => return None,
        };
        Some(kind)
    }
}

/// Borrow a node's parameters as `P`, failing on a kind mismatch
pub fn params<P: NodeParams>(node: &Node<PipelineNode>) -> Result<&P> {
    P::from_kind(&node.kind).ok_or_else(|| PipelineError::NodeTypeMismatch {
        node: node.id.clone(),
        expected: P::NODE_TYPE.to_string(),
        actual: node.type_tag().to_string(),
    })
}

/// Patch `P` in place; other kinds are left untouched
pub fn update_params<P: NodeParams>(kind: &mut PipelineNode, update: impl FnOnce(&mut P)) {
    if let Some(params) = P::from_kind_mut(kind) {
        update(params);
    }
}

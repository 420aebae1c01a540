//! Test fixtures: an in-process provider and document helpers

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use pipeline_engine::{
    Document, ExecutionResult, InputValues, NodeContext, OutputValue, PipelineValue, Result,
};

use crate::api::{
    ApiError, GenerateRequest, GenerateResponse, GenerateTextRequest, ImageResponse,
    IpAdapterRequest, PipelineApi, StyleTransferRequest, TextResponse, UpscaleRequest,
};
use crate::builtins::builtin_registry;
use crate::kinds::{NodeParams, PipelineNode};

/// One request seen by [`MockPipelineApi`]
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ApiCall {
    Generate(GenerateRequest),
    Upscale(UpscaleRequest),
    IpAdapter(IpAdapterRequest),
    StyleTransfer(StyleTransferRequest),
    GenerateText(GenerateTextRequest),
    FetchImage(String),
}

/// Records requests and answers with `mock://<endpoint>/<n>` urls
#[derive(Default)]
pub(crate) struct MockPipelineApi {
    calls: Mutex<Vec<ApiCall>>,
    failure: Mutex<Option<String>>,
    images: Mutex<HashMap<String, Vec<u8>>>,
    on_generate: Mutex<Option<GenerateHook>>,
}

type GenerateHook = Box<dyn Fn(usize) + Send + Sync>;

impl MockPipelineApi {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every following request fail with `message`
    pub(crate) fn fail_with(&self, message: &str) {
        *self.failure.lock() = Some(message.to_string());
    }

    /// Serve `bytes` for `url` from `fetch_image`
    pub(crate) fn serve_image(&self, url: &str, bytes: Vec<u8>) {
        self.images.lock().insert(url.to_string(), bytes);
    }

    /// Call `hook` with the request count after every `generate`
    pub(crate) fn after_generate(&self, hook: impl Fn(usize) + Send + Sync + 'static) {
        *self.on_generate.lock() = Some(Box::new(hook));
    }

    pub(crate) fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().clone()
    }

    pub(crate) fn generate_requests(&self) -> Vec<GenerateRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::Generate(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ApiCall) -> std::result::Result<usize, ApiError> {
        if let Some(message) = self.failure.lock().clone() {
            return Err(ApiError::Status {
                status: 500,
                message,
            });
        }
        let mut calls = self.calls.lock();
        calls.push(call);
        Ok(calls.len())
    }
}

#[async_trait]
impl PipelineApi for MockPipelineApi {
    async fn generate(
        &self,
        request: GenerateRequest,
    ) -> std::result::Result<GenerateResponse, ApiError> {
        let seed = request.seed;
        let n = self.record(ApiCall::Generate(request))?;
        if let Some(hook) = &*self.on_generate.lock() {
            hook(n);
        }
        Ok(GenerateResponse {
            image_url: format!("mock://generate/{}", n),
            seed,
        })
    }

    async fn upscale(
        &self,
        request: UpscaleRequest,
    ) -> std::result::Result<ImageResponse, ApiError> {
        let n = self.record(ApiCall::Upscale(request))?;
        Ok(ImageResponse {
            image_url: format!("mock://upscale/{}", n),
        })
    }

    async fn ip_adapter(
        &self,
        request: IpAdapterRequest,
    ) -> std::result::Result<ImageResponse, ApiError> {
        let n = self.record(ApiCall::IpAdapter(request))?;
        Ok(ImageResponse {
            image_url: format!("mock://ip-adapter/{}", n),
        })
    }

    async fn style_transfer(
        &self,
        request: StyleTransferRequest,
    ) -> std::result::Result<ImageResponse, ApiError> {
        let n = self.record(ApiCall::StyleTransfer(request))?;
        Ok(ImageResponse {
            image_url: format!("mock://style-transfer/{}", n),
        })
    }

    async fn generate_text(
        &self,
        request: GenerateTextRequest,
    ) -> std::result::Result<TextResponse, ApiError> {
        let text = format!("text for {}", request.prompt);
        self.record(ApiCall::GenerateText(request))?;
        Ok(TextResponse { text })
    }

    async fn fetch_image(&self, url: &str) -> std::result::Result<Vec<u8>, ApiError> {
        self.record(ApiCall::FetchImage(url.to_string()))?;
        self.images
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| ApiError::Status {
                status: 404,
                message: format!("No image at {}", url),
            })
    }
}

/// Document over the built-in registry, backed by `api`
pub(crate) fn test_document(api: Arc<MockPipelineApi>) -> Arc<Document<PipelineNode>> {
    init_logging();
    Arc::new(Document::new(Arc::new(builtin_registry(api))))
}

/// Add a node with default parameters of type `P`, patched by `update`
pub(crate) fn add_node<P: NodeParams>(
    doc: &Document<PipelineNode>,
    id: &str,
    update: impl FnOnce(&mut P),
) {
    let mut params = P::default();
    update(&mut params);
    doc.add_node(id, params.into_kind()).unwrap();
}

/// Current parameters of a node
pub(crate) fn params_of<P: NodeParams + Clone>(doc: &Document<PipelineNode>, id: &str) -> P {
    let node = doc.get_node(id).unwrap();
    P::from_kind(&node.kind).unwrap().clone()
}

/// Execute one node directly, outside any run
pub(crate) async fn run_node(
    doc: &Arc<Document<PipelineNode>>,
    id: &str,
    inputs: InputValues,
) -> Result<ExecutionResult> {
    let node = doc.get_node(id).unwrap();
    let operation = doc.registry().operation_for(&node)?;
    let ctx = NodeContext::standalone(id, doc.clone());
    operation.execute(&ctx, &node, inputs).await
}

/// The value on an output port
pub(crate) fn output<'a>(result: &'a ExecutionResult, port: &str) -> &'a PipelineValue {
    match &result[port] {
        OutputValue::Value(value) => value,
        OutputValue::Stop => panic!("unexpected stop on {}", port),
    }
}

pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

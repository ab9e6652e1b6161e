//! Compute graphs for the local node-graph engine.
//!
//! A [`ComputeGraph`] is an ordered set of typed operations. Nodes are only
//! created through [`GraphBuilder`], whose per-operation constructors take
//! typed output handles ([`Link`]) of nodes that already exist, so a graph
//! cannot reference a node that comes later or does not exist, and a sampler
//! cannot be fed a VAE where it expects a model.
//!
//! The engine receives the graph as its JSON workflow format:
//!
//! ```text
//! { "3": { "class_type": "KSampler", "inputs": { "model": ["2", 0], "seed": 7, ... } } }
//! ```
//!
//! Links are `[producer_id, output_slot]` pairs; the engine performs the
//! topological execution itself.

use std::fmt;
use std::marker::PhantomData;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::DomainError;

// =============================================================================
// Node ids and typed links
// =============================================================================

/// Stable string id of a node inside one graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Output slot kinds. Used only as type parameters of [`Link`].
pub mod slot {
    #[derive(Debug)]
    pub enum Model {}
    #[derive(Debug)]
    pub enum Clip {}
    #[derive(Debug)]
    pub enum Vae {}
    #[derive(Debug)]
    pub enum Conditioning {}
    #[derive(Debug)]
    pub enum Latent {}
    #[derive(Debug)]
    pub enum Image {}
    #[derive(Debug)]
    pub enum Mask {}
}

/// Untyped edge as stored in a node: `(producer node, output slot)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinkRef {
    pub node: NodeId,
    pub slot: u32,
}

impl LinkRef {
    fn to_json(&self) -> Value {
        json!([self.node.as_str(), self.slot])
    }
}

/// Typed handle to one output of an existing node.
///
/// Only [`GraphBuilder`] creates these.
pub struct Link<K> {
    inner: LinkRef,
    _kind: PhantomData<fn() -> K>,
}

impl<K> Link<K> {
    fn new(node: &NodeId, slot: u32) -> Self {
        Self {
            inner: LinkRef {
                node: node.clone(),
                slot,
            },
            _kind: PhantomData,
        }
    }

    pub fn node(&self) -> &NodeId {
        &self.inner.node
    }

    pub fn slot(&self) -> u32 {
        self.inner.slot
    }

    fn erase(&self) -> LinkRef {
        self.inner.clone()
    }
}

impl<K> Clone for Link<K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K> fmt::Debug for Link<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Link({}:{})", self.inner.node, self.inner.slot)
    }
}

// =============================================================================
// Operations
// =============================================================================

/// Coarse operation vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    AssetLoader,
    ModelLoader,
    TextEncoder,
    LatentSource,
    ImageToLatent,
    LatentMask,
    Sampler,
    LatentToImage,
    AssetWriter,
}

/// Sampler settings that are literals rather than links.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerSettings {
    pub seed: u32,
    pub steps: u32,
    pub cfg: f64,
    pub sampler_name: String,
    pub scheduler: String,
    /// 1.0 regenerates from pure noise; lower keeps more of the input latent
    pub denoise: f64,
}

/// One node's operation with its inputs.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    LoadImage {
        image: String,
    },
    LoadImageMask {
        image: String,
        channel: String,
    },
    CheckpointLoader {
        ckpt_name: String,
    },
    TextEncode {
        text: String,
        clip: LinkRef,
    },
    EmptyLatent {
        width: u32,
        height: u32,
        batch_size: u32,
    },
    VaeEncode {
        pixels: LinkRef,
        vae: LinkRef,
    },
    SetLatentNoiseMask {
        samples: LinkRef,
        mask: LinkRef,
    },
    Sampler {
        model: LinkRef,
        positive: LinkRef,
        negative: LinkRef,
        latent_image: LinkRef,
        settings: SamplerSettings,
    },
    VaeDecode {
        samples: LinkRef,
        vae: LinkRef,
    },
    SaveImage {
        images: LinkRef,
        filename_prefix: String,
    },
}

impl Operation {
    /// Engine class name.
    pub fn class_type(&self) -> &'static str {
        match self {
            Self::LoadImage { .. } => "LoadImage",
            Self::LoadImageMask { .. } => "LoadImageMask",
            Self::CheckpointLoader { .. } => "CheckpointLoaderSimple",
            Self::TextEncode { .. } => "CLIPTextEncode",
            Self::EmptyLatent { .. } => "EmptyLatentImage",
            Self::VaeEncode { .. } => "VAEEncode",
            Self::SetLatentNoiseMask { .. } => "SetLatentNoiseMask",
            Self::Sampler { .. } => "KSampler",
            Self::VaeDecode { .. } => "VAEDecode",
            Self::SaveImage { .. } => "SaveImage",
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Self::LoadImage { .. } | Self::LoadImageMask { .. } => OperationKind::AssetLoader,
            Self::CheckpointLoader { .. } => OperationKind::ModelLoader,
            Self::TextEncode { .. } => OperationKind::TextEncoder,
            Self::EmptyLatent { .. } => OperationKind::LatentSource,
            Self::VaeEncode { .. } => OperationKind::ImageToLatent,
            Self::SetLatentNoiseMask { .. } => OperationKind::LatentMask,
            Self::Sampler { .. } => OperationKind::Sampler,
            Self::VaeDecode { .. } => OperationKind::LatentToImage,
            Self::SaveImage { .. } => OperationKind::AssetWriter,
        }
    }

    /// Number of output slots the engine exposes for this class.
    pub fn output_count(&self) -> u32 {
        match self {
            Self::LoadImage { .. } => 2,
            Self::CheckpointLoader { .. } => 3,
            Self::SaveImage { .. } => 0,
            _ => 1,
        }
    }

    /// Incoming edges, in input order.
    pub fn links(&self) -> Vec<&LinkRef> {
        match self {
            Self::LoadImage { .. }
            | Self::LoadImageMask { .. }
            | Self::CheckpointLoader { .. }
            | Self::EmptyLatent { .. } => Vec::new(),
            Self::TextEncode { clip, .. } => vec![clip],
            Self::VaeEncode { pixels, vae } => vec![pixels, vae],
            Self::SetLatentNoiseMask { samples, mask } => vec![samples, mask],
            Self::Sampler {
                model,
                positive,
                negative,
                latent_image,
                ..
            } => vec![model, positive, negative, latent_image],
            Self::VaeDecode { samples, vae } => vec![samples, vae],
            Self::SaveImage { images, .. } => vec![images],
        }
    }

    fn inputs_json(&self) -> Map<String, Value> {
        let inputs = match self {
            Self::LoadImage { image } => json!({ "image": image }),
            Self::LoadImageMask { image, channel } => json!({
                "image": image,
                "channel": channel,
            }),
            Self::CheckpointLoader { ckpt_name } => json!({ "ckpt_name": ckpt_name }),
            Self::TextEncode { text, clip } => json!({
                "text": text,
                "clip": clip.to_json(),
            }),
            Self::EmptyLatent {
                width,
                height,
                batch_size,
            } => json!({
                "width": width,
                "height": height,
                "batch_size": batch_size,
            }),
            Self::VaeEncode { pixels, vae } => json!({
                "pixels": pixels.to_json(),
                "vae": vae.to_json(),
            }),
            Self::SetLatentNoiseMask { samples, mask } => json!({
                "samples": samples.to_json(),
                "mask": mask.to_json(),
            }),
            Self::Sampler {
                model,
                positive,
                negative,
                latent_image,
                settings,
            } => json!({
                "seed": settings.seed,
                "steps": settings.steps,
                "cfg": settings.cfg,
                "sampler_name": settings.sampler_name,
                "scheduler": settings.scheduler,
                "denoise": settings.denoise,
                "model": model.to_json(),
                "positive": positive.to_json(),
                "negative": negative.to_json(),
                "latent_image": latent_image.to_json(),
            }),
            Self::VaeDecode { samples, vae } => json!({
                "samples": samples.to_json(),
                "vae": vae.to_json(),
            }),
            Self::SaveImage {
                images,
                filename_prefix,
            } => json!({
                "filename_prefix": filename_prefix,
                "images": images.to_json(),
            }),
        };
        match inputs {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

/// A node of the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub id: NodeId,
    pub operation: Operation,
}

// =============================================================================
// Graph
// =============================================================================

/// Immutable, ordered compute graph.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeGraph {
    nodes: Vec<GraphNode>,
}

impl ComputeGraph {
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &NodeId) -> Option<&GraphNode> {
        self.nodes.iter().find(|node| &node.id == id)
    }

    /// All nodes of one vocabulary kind, in graph order.
    pub fn nodes_of_kind(&self, kind: OperationKind) -> impl Iterator<Item = &GraphNode> {
        self.nodes
            .iter()
            .filter(move |node| node.operation.kind() == kind)
    }

    /// Every edge as `(consumer, producer link)`.
    pub fn edges(&self) -> Vec<(&NodeId, &LinkRef)> {
        self.nodes
            .iter()
            .flat_map(|node| node.operation.links().into_iter().map(move |l| (&node.id, l)))
            .collect()
    }

    /// The single sampler's literal settings, if the graph has one.
    pub fn sampler_settings(&self) -> Option<&SamplerSettings> {
        self.nodes.iter().find_map(|node| match &node.operation {
            Operation::Sampler { settings, .. } => Some(settings),
            _ => None,
        })
    }

    /// Check that ids are unique and every link points at an existing output
    /// of a node defined earlier (which also rules out cycles).
    pub fn validate(&self) -> Result<(), DomainError> {
        for (index, node) in self.nodes.iter().enumerate() {
            if self.nodes[..index].iter().any(|earlier| earlier.id == node.id) {
                return Err(DomainError::validation(format!(
                    "duplicate node id {}",
                    node.id
                )));
            }
            for link in node.operation.links() {
                let Some(producer) = self.nodes[..index].iter().find(|n| n.id == link.node)
                else {
                    return Err(DomainError::validation(format!(
                        "node {} references {} which is not defined before it",
                        node.id, link.node
                    )));
                };
                if link.slot >= producer.operation.output_count() {
                    return Err(DomainError::validation(format!(
                        "node {} references missing output {} of {}",
                        node.id, link.slot, link.node
                    )));
                }
            }
        }
        Ok(())
    }

    /// The engine's JSON workflow representation.
    pub fn to_workflow(&self) -> Value {
        let mut workflow = Map::new();
        for node in &self.nodes {
            workflow.insert(node.id.to_string(), node_json(node));
        }
        Value::Object(workflow)
    }
}

fn node_json(node: &GraphNode) -> Value {
    json!({
        "class_type": node.operation.class_type(),
        "inputs": Value::Object(node.operation.inputs_json()),
    })
}

impl Serialize for ComputeGraph {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.nodes.len()))?;
        for node in &self.nodes {
            map.serialize_entry(node.id.as_str(), &node_json(node))?;
        }
        map.end()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Outputs of a checkpoint loader.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub model: Link<slot::Model>,
    pub clip: Link<slot::Clip>,
    pub vae: Link<slot::Vae>,
}

/// Linked inputs of a sampler node.
#[derive(Debug)]
pub struct SamplerInputs<'a> {
    pub model: &'a Link<slot::Model>,
    pub positive: &'a Link<slot::Conditioning>,
    pub negative: &'a Link<slot::Conditioning>,
    pub latent_image: &'a Link<slot::Latent>,
    pub settings: SamplerSettings,
}

/// Append-only graph builder. Ids are assigned sequentially ("1", "2", ...).
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<GraphNode>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, operation: Operation) -> NodeId {
        let id = NodeId((self.nodes.len() + 1).to_string());
        self.nodes.push(GraphNode {
            id: id.clone(),
            operation,
        });
        id
    }

    /// Load an uploaded asset by its engine filename.
    pub fn load_image(&mut self, image: &str) -> Link<slot::Image> {
        let id = self.push(Operation::LoadImage {
            image: image.to_string(),
        });
        Link::new(&id, 0)
    }

    /// Load an uploaded asset as a single-channel mask.
    pub fn load_image_mask(&mut self, image: &str) -> Link<slot::Mask> {
        let id = self.push(Operation::LoadImageMask {
            image: image.to_string(),
            channel: "red".to_string(),
        });
        Link::new(&id, 0)
    }

    pub fn checkpoint(&mut self, ckpt_name: &str) -> Checkpoint {
        let id = self.push(Operation::CheckpointLoader {
            ckpt_name: ckpt_name.to_string(),
        });
        Checkpoint {
            model: Link::new(&id, 0),
            clip: Link::new(&id, 1),
            vae: Link::new(&id, 2),
        }
    }

    pub fn encode_text(&mut self, text: &str, clip: &Link<slot::Clip>) -> Link<slot::Conditioning> {
        let id = self.push(Operation::TextEncode {
            text: text.to_string(),
            clip: clip.erase(),
        });
        Link::new(&id, 0)
    }

    pub fn empty_latent(&mut self, width: u32, height: u32) -> Link<slot::Latent> {
        let id = self.push(Operation::EmptyLatent {
            width,
            height,
            batch_size: 1,
        });
        Link::new(&id, 0)
    }

    pub fn encode_image(
        &mut self,
        pixels: &Link<slot::Image>,
        vae: &Link<slot::Vae>,
    ) -> Link<slot::Latent> {
        let id = self.push(Operation::VaeEncode {
            pixels: pixels.erase(),
            vae: vae.erase(),
        });
        Link::new(&id, 0)
    }

    pub fn mask_latent(
        &mut self,
        samples: &Link<slot::Latent>,
        mask: &Link<slot::Mask>,
    ) -> Link<slot::Latent> {
        let id = self.push(Operation::SetLatentNoiseMask {
            samples: samples.erase(),
            mask: mask.erase(),
        });
        Link::new(&id, 0)
    }

    pub fn sample(&mut self, inputs: SamplerInputs<'_>) -> Link<slot::Latent> {
        let id = self.push(Operation::Sampler {
            model: inputs.model.erase(),
            positive: inputs.positive.erase(),
            negative: inputs.negative.erase(),
            latent_image: inputs.latent_image.erase(),
            settings: inputs.settings,
        });
        Link::new(&id, 0)
    }

    pub fn decode(
        &mut self,
        samples: &Link<slot::Latent>,
        vae: &Link<slot::Vae>,
    ) -> Link<slot::Image> {
        let id = self.push(Operation::VaeDecode {
            samples: samples.erase(),
            vae: vae.erase(),
        });
        Link::new(&id, 0)
    }

    pub fn save(&mut self, images: &Link<slot::Image>, filename_prefix: &str) -> NodeId {
        self.push(Operation::SaveImage {
            images: images.erase(),
            filename_prefix: filename_prefix.to_string(),
        })
    }

    pub fn finish(self) -> ComputeGraph {
        let graph = ComputeGraph { nodes: self.nodes };
        debug_assert!(graph.validate().is_ok(), "builder produced an invalid graph");
        graph
    }
}

// =============================================================================
// Generation graphs
// =============================================================================

/// Engine-side settings that do not vary per request.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphSettings {
    pub checkpoint: String,
    /// Canvas for text-to-image runs
    pub width: u32,
    pub height: u32,
    pub sampler_name: String,
    pub scheduler: String,
    pub filename_prefix: String,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            checkpoint: "sd_xl_base_1.0.safetensors".to_string(),
            width: 1024,
            height: 1024,
            sampler_name: "euler".to_string(),
            scheduler: "normal".to_string(),
            filename_prefix: "transmute".to_string(),
        }
    }
}

/// Per-request inputs of [`build_graph`].
#[derive(Debug, Clone)]
pub struct GraphSpec<'a> {
    /// Engine filename of the uploaded source; `None` builds text-to-image
    pub asset: Option<&'a str>,
    /// Engine filename of the uploaded inpaint mask
    pub mask_asset: Option<&'a str>,
    pub positive: &'a str,
    pub negative: &'a str,
    pub strength: f64,
    pub guidance_scale: f64,
    pub steps: u32,
    pub seed: Option<u32>,
    pub settings: &'a GraphSettings,
}

/// Build the full generation graph for one request.
///
/// `random_seed` is called exactly once, and only when `spec.seed` is `None`.
pub fn build_graph(spec: &GraphSpec<'_>, random_seed: impl FnOnce() -> u32) -> ComputeGraph {
    let seed = spec.seed.unwrap_or_else(random_seed);
    let settings = spec.settings;
    let mut builder = GraphBuilder::new();

    let source = spec.asset.map(|asset| builder.load_image(asset));
    let mask = match (&source, spec.mask_asset) {
        (Some(_), Some(mask)) => Some(builder.load_image_mask(mask)),
        _ => None,
    };
    let checkpoint = builder.checkpoint(&settings.checkpoint);
    let positive = builder.encode_text(spec.positive, &checkpoint.clip);
    let negative = builder.encode_text(spec.negative, &checkpoint.clip);

    let (latent, denoise) = match &source {
        Some(pixels) => {
            let encoded = builder.encode_image(pixels, &checkpoint.vae);
            let latent = match &mask {
                Some(mask) => builder.mask_latent(&encoded, mask),
                None => encoded,
            };
            (latent, spec.strength.clamp(0.0, 1.0))
        }
        None => (builder.empty_latent(settings.width, settings.height), 1.0),
    };

    let sampled = builder.sample(SamplerInputs {
        model: &checkpoint.model,
        positive: &positive,
        negative: &negative,
        latent_image: &latent,
        settings: SamplerSettings {
            seed,
            steps: spec.steps,
            cfg: spec.guidance_scale,
            sampler_name: settings.sampler_name.clone(),
            scheduler: settings.scheduler.clone(),
            denoise,
        },
    });
    let image = builder.decode(&sampled, &checkpoint.vae);
    builder.save(&image, &settings.filename_prefix);

    builder.finish()
}

//! EfficientNet-style classifier built with Burn
//!
//! Stem convolution, seven stages of MBConv blocks (depthwise convolution
//! with squeeze-and-excitation), a 1x1 head convolution, global average
//! pooling and a linear classification head. Width and depth follow the
//! compound scaling coefficients of the selected backbone variant.
//!
//! The backbone and the classification head are separate submodules, so
//! backbone weights can be loaded from a record file while the head is
//! always created for the target class count.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig,
        PaddingConfig2d,
    },
    record::CompactRecorder,
    tensor::{
        activation::{sigmoid, silu, softmax},
        backend::Backend,
        Tensor,
    },
};
use serde::{Deserialize, Serialize};

use crate::utils::error::SkinLesionError;

/// Backbone variants and their compound scaling coefficients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Backbone {
    #[serde(rename = "efficientnet_b0")]
    EfficientNetB0,
    #[serde(rename = "efficientnet_b1")]
    EfficientNetB1,
    #[serde(rename = "efficientnet_b2")]
    EfficientNetB2,
    #[serde(rename = "efficientnet_b3")]
    EfficientNetB3,
}

impl Backbone {
    /// Identifier used in checkpoint file names
    pub fn id(&self) -> &'static str {
        match self {
            Backbone::EfficientNetB0 => "efficientnet_b0",
            Backbone::EfficientNetB1 => "efficientnet_b1",
            Backbone::EfficientNetB2 => "efficientnet_b2",
            Backbone::EfficientNetB3 => "efficientnet_b3",
        }
    }

    /// (width multiplier, depth multiplier, native resolution, dropout)
    pub fn coefficients(&self) -> (f64, f64, usize, f64) {
        match self {
            Backbone::EfficientNetB0 => (1.0, 1.0, 224, 0.2),
            Backbone::EfficientNetB1 => (1.0, 1.1, 240, 0.2),
            Backbone::EfficientNetB2 => (1.1, 1.2, 260, 0.3),
            Backbone::EfficientNetB3 => (1.2, 1.4, 300, 0.3),
        }
    }
}

impl FromStr for Backbone {
    type Err = SkinLesionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "efficientnet_b0" | "b0" => Ok(Backbone::EfficientNetB0),
            "efficientnet_b1" | "b1" => Ok(Backbone::EfficientNetB1),
            "efficientnet_b2" | "b2" => Ok(Backbone::EfficientNetB2),
            "efficientnet_b3" | "b3" => Ok(Backbone::EfficientNetB3),
            other => Err(SkinLesionError::Config(format!("unknown backbone '{}'", other))),
        }
    }
}

impl fmt::Display for Backbone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// One stage of the base (B0) network
struct StageSpec {
    expand_ratio: usize,
    kernel: usize,
    stride: usize,
    out_channels: usize,
    repeats: usize,
}

const BASE_STEM_CHANNELS: usize = 32;
const BASE_HEAD_CHANNELS: usize = 1280;

const BASE_STAGES: [StageSpec; 7] = [
    StageSpec { expand_ratio: 1, kernel: 3, stride: 1, out_channels: 16, repeats: 1 },
    StageSpec { expand_ratio: 6, kernel: 3, stride: 2, out_channels: 24, repeats: 2 },
    StageSpec { expand_ratio: 6, kernel: 5, stride: 2, out_channels: 40, repeats: 2 },
    StageSpec { expand_ratio: 6, kernel: 3, stride: 2, out_channels: 80, repeats: 3 },
    StageSpec { expand_ratio: 6, kernel: 5, stride: 1, out_channels: 112, repeats: 3 },
    StageSpec { expand_ratio: 6, kernel: 5, stride: 2, out_channels: 192, repeats: 4 },
    StageSpec { expand_ratio: 6, kernel: 3, stride: 1, out_channels: 320, repeats: 1 },
];

/// Scale a channel count and round to a multiple of 8
pub fn round_filters(channels: usize, width: f64) -> usize {
    let divisor = 8usize;
    let scaled = channels as f64 * width;
    let mut rounded = ((scaled + divisor as f64 / 2.0) as usize / divisor * divisor).max(divisor);
    if (rounded as f64) < 0.9 * scaled {
        rounded += divisor;
    }
    rounded
}

/// Scale a stage's repeat count
pub fn round_repeats(repeats: usize, depth: f64) -> usize {
    ((repeats as f64 * depth).ceil() as usize).max(1)
}

/// Configuration for the LesionClassifier
#[derive(Config, Debug)]
pub struct LesionClassifierConfig {
    /// Number of output classes
    #[config(default = "9")]
    pub num_classes: usize,

    #[config(default = "Backbone::EfficientNetB3")]
    pub backbone: Backbone,

    /// Overrides the backbone's dropout before the head
    #[config(default = "None")]
    pub dropout: Option<f64>,

    /// Overrides the backbone's width multiplier
    #[config(default = "None")]
    pub width_multiplier: Option<f64>,

    /// Overrides the backbone's depth multiplier
    #[config(default = "None")]
    pub depth_multiplier: Option<f64>,
}

/// Convolution followed by batch norm
#[derive(Module, Debug)]
pub struct ConvBn<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B>,
}

impl<B: Backend> ConvBn<B> {
    fn new(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        groups: usize,
        device: &B::Device,
    ) -> Self {
        let padding = kernel / 2;
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel, kernel])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(padding, padding))
            .with_groups(groups)
            .with_bias(false)
            .init(device);
        let bn = BatchNormConfig::new(out_channels).init(device);

        Self { conv, bn }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(x))
    }
}

/// Channel attention: pool, reduce, expand, gate
#[derive(Module, Debug)]
pub struct SqueezeExcite<B: Backend> {
    pub pool: AdaptiveAvgPool2d,
    pub reduce: Conv2d<B>,
    pub expand: Conv2d<B>,
}

impl<B: Backend> SqueezeExcite<B> {
    fn new(channels: usize, squeeze_channels: usize, device: &B::Device) -> Self {
        Self {
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            reduce: Conv2dConfig::new([channels, squeeze_channels], [1, 1]).init(device),
            expand: Conv2dConfig::new([squeeze_channels, channels], [1, 1]).init(device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let scale = self.pool.forward(x.clone());
        let scale = silu(self.reduce.forward(scale));
        let scale = sigmoid(self.expand.forward(scale));
        x * scale
    }
}

/// Inverted residual block
#[derive(Module, Debug)]
pub struct MBConv<B: Backend> {
    pub expand: Option<ConvBn<B>>,
    pub depthwise: ConvBn<B>,
    pub se: SqueezeExcite<B>,
    pub project: ConvBn<B>,
    residual: bool,
}

impl<B: Backend> MBConv<B> {
    fn new(
        in_channels: usize,
        out_channels: usize,
        expand_ratio: usize,
        kernel: usize,
        stride: usize,
        device: &B::Device,
    ) -> Self {
        let hidden = in_channels * expand_ratio;
        let expand = if expand_ratio != 1 {
            Some(ConvBn::new(in_channels, hidden, 1, 1, 1, device))
        } else {
            None
        };
        let squeeze_channels = (in_channels / 4).max(1);

        Self {
            expand,
            depthwise: ConvBn::new(hidden, hidden, kernel, stride, hidden, device),
            se: SqueezeExcite::new(hidden, squeeze_channels, device),
            project: ConvBn::new(hidden, out_channels, 1, 1, 1, device),
            residual: stride == 1 && in_channels == out_channels,
        }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = match &self.expand {
            Some(expand) => silu(expand.forward(input.clone())),
            None => input.clone(),
        };
        let x = silu(self.depthwise.forward(x));
        let x = self.se.forward(x);
        let x = self.project.forward(x);

        if self.residual {
            x + input
        } else {
            x
        }
    }
}

/// Feature extractor: everything up to the pooled feature map
#[derive(Module, Debug)]
pub struct EfficientNetBackbone<B: Backend> {
    pub stem: ConvBn<B>,
    pub blocks: Vec<MBConv<B>>,
    pub head: ConvBn<B>,
    out_channels: usize,
}

impl<B: Backend> EfficientNetBackbone<B> {
    pub fn new(width: f64, depth: f64, device: &B::Device) -> Self {
        let stem_channels = round_filters(BASE_STEM_CHANNELS, width);
        let stem = ConvBn::new(3, stem_channels, 3, 2, 1, device);

        let mut blocks = Vec::new();
        let mut in_channels = stem_channels;
        for stage in BASE_STAGES.iter() {
            let out_channels = round_filters(stage.out_channels, width);
            for i in 0..round_repeats(stage.repeats, depth) {
                let stride = if i == 0 { stage.stride } else { 1 };
                blocks.push(MBConv::new(
                    in_channels,
                    out_channels,
                    stage.expand_ratio,
                    stage.kernel,
                    stride,
                    device,
                ));
                in_channels = out_channels;
            }
        }

        let out_channels = round_filters(BASE_HEAD_CHANNELS, width);
        let head = ConvBn::new(in_channels, out_channels, 1, 1, 1, device);

        Self {
            stem,
            blocks,
            head,
            out_channels,
        }
    }

    /// [B, 3, H, W] -> [B, C, H/32, W/32]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = silu(self.stem.forward(x));
        for block in &self.blocks {
            x = block.forward(x);
        }
        silu(self.head.forward(x))
    }

    /// Channel count of the feature map
    pub fn out_channels(&self) -> usize {
        self.out_channels
    }
}

/// Skin lesion classifier: EfficientNet backbone plus a linear head
#[derive(Module, Debug)]
pub struct LesionClassifier<B: Backend> {
    pub backbone: EfficientNetBackbone<B>,
    pub pool: AdaptiveAvgPool2d,
    pub dropout: Dropout,
    pub classifier: Linear<B>,
    num_classes: usize,
}

impl<B: Backend> LesionClassifier<B> {
    pub fn new(config: &LesionClassifierConfig, device: &B::Device) -> Self {
        let (width, depth, _, dropout) = config.backbone.coefficients();
        let width = config.width_multiplier.unwrap_or(width);
        let depth = config.depth_multiplier.unwrap_or(depth);
        let dropout = config.dropout.unwrap_or(dropout);

        let backbone = EfficientNetBackbone::new(width, depth, device);
        let classifier = LinearConfig::new(backbone.out_channels(), config.num_classes).init(device);

        Self {
            backbone,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dropout: DropoutConfig::new(dropout).init(),
            classifier,
            num_classes: config.num_classes,
        }
    }

    /// Logits of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.backbone.forward(x);
        let x = self.pool.forward(x);

        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let x = self.dropout.forward(x);
        self.classifier.forward(x)
    }

    /// Forward pass with softmax for inference
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(x), 1)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Replace the backbone with weights from a Burn record file.
    ///
    /// The record must come from a backbone built with the same width and
    /// depth multipliers; the classification head is left untouched.
    pub fn with_backbone_weights(
        mut self,
        path: &Path,
        device: &B::Device,
    ) -> crate::utils::error::Result<Self> {
        self.backbone = self
            .backbone
            .load_file(path, &CompactRecorder::new(), device)
            .map_err(|e| {
                SkinLesionError::Model(format!(
                    "failed to load backbone weights from {}: {:?}",
                    path.display(),
                    e
                ))
            })?;
        Ok(self)
    }
}

//! 2D convolutional encoder for image-shaped modalities (tactile arrays).
//!
//! The flat input `[batch, channels * height * width]` is reinterpreted as a
//! row-major `[batch, channels, height, width]` image, passed through a stack
//! of unpadded convolutions and flattened into an MLP head.

use burn::module::{Ignored, Module};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::activation::Activation;
use super::embedder::Embedder;
use super::mlp::{Mlp, MlpConfig};
use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct Cnn2dEncoderConfig {
    pub input_dim: usize,
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    /// Output channels of each convolution.
    pub conv_channels: Vec<usize>,
    pub kernel_size: usize,
    pub stride: usize,
    /// Hidden widths of the MLP head.
    pub hidden_dims: Vec<usize>,
    pub embedding_dim: usize,
    pub activation: Activation,
    pub final_activation: Option<Activation>,
}

impl Cnn2dEncoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<Cnn2dEncoder<B>, ConfigError> {
        if self.channels * self.height * self.width != self.input_dim {
            return Err(ConfigError::ImageShapeMismatch {
                channels: self.channels,
                height: self.height,
                width: self.width,
                input_dim: self.input_dim,
            });
        }
        if self.kernel_size == 0 {
            return Err(ConfigError::ZeroSized { field: "kernel_size" });
        }
        if self.stride == 0 {
            return Err(ConfigError::ZeroSized { field: "stride" });
        }

        let mut convs = Vec::with_capacity(self.conv_channels.len());
        let (mut in_channels, mut height, mut width) = (self.channels, self.height, self.width);

        for &out_channels in &self.conv_channels {
            if height < self.kernel_size || width < self.kernel_size {
                return Err(ConfigError::ConvolutionTooDeep {
                    kernel_size: self.kernel_size,
                    stride: self.stride,
                    height,
                    width,
                });
            }
            convs.push(
                Conv2dConfig::new([in_channels, out_channels], [self.kernel_size, self.kernel_size])
                    .with_stride([self.stride, self.stride])
                    .init(device),
            );
            height = (height - self.kernel_size) / self.stride + 1;
            width = (width - self.kernel_size) / self.stride + 1;
            in_channels = out_channels;
        }

        let flat_dim = in_channels * height * width;
        let head = MlpConfig::new(flat_dim, self.hidden_dims.clone(), self.embedding_dim)
            .with_activation(self.activation)
            .with_final_activation(self.final_activation)
            .init(device);

        Ok(Cnn2dEncoder {
            convs,
            head,
            activation: Ignored(self.activation),
            channels: self.channels,
            height: self.height,
            width: self.width,
            flat_dim,
        })
    }
}

#[derive(Module, Debug)]
pub struct Cnn2dEncoder<B: Backend> {
    convs: Vec<Conv2d<B>>,
    head: Mlp<B>,
    activation: Ignored<Activation>,
    #[module(skip)]
    channels: usize,
    #[module(skip)]
    height: usize,
    #[module(skip)]
    width: usize,
    #[module(skip)]
    flat_dim: usize,
}

impl<B: Backend> Cnn2dEncoder<B> {
    /// Width of the flattened feature map fed to the head.
    pub fn flat_dim(&self) -> usize {
        self.flat_dim
    }
}

impl<B: Backend> Embedder<B> for Cnn2dEncoder<B> {
    fn embed(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let [batch, _] = input.dims();
        let mut x: Tensor<B, 4> = input.reshape([batch, self.channels, self.height, self.width]);

        for conv in &self.convs {
            x = self.activation.apply(conv.forward(x));
        }

        self.head.forward(x.reshape([batch, self.flat_dim]))
    }

    fn input_dim(&self) -> usize {
        self.channels * self.height * self.width
    }

    fn embedding_dim(&self) -> usize {
        self.head.output_dim()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    fn config(conv_channels: Vec<usize>, stride: usize) -> Cnn2dEncoderConfig {
        Cnn2dEncoderConfig {
            input_dim: 2 * 17 * 13,
            channels: 2,
            height: 17,
            width: 13,
            conv_channels,
            kernel_size: 3,
            stride,
            hidden_dims: vec![32],
            embedding_dim: 16,
            activation: Activation::Elu,
            final_activation: None,
        }
    }

    #[test]
    fn test_feature_map_size() {
        let device = Default::default();
        let encoder = config(vec![8, 8], 1).init::<B>(&device).unwrap();
        // 17x13 -> 15x11 -> 13x9
        assert_eq!(encoder.flat_dim(), 8 * 13 * 9);

        let out = encoder.embed(Tensor::zeros([4, 2 * 17 * 13], &device));
        assert_eq!(out.dims(), [4, 16]);
    }

    #[test]
    fn test_strided_feature_map_size() {
        let device = Default::default();
        let encoder = config(vec![4], 2).init::<B>(&device).unwrap();
        // (17 - 3) / 2 + 1 = 8, (13 - 3) / 2 + 1 = 6
        assert_eq!(encoder.flat_dim(), 4 * 8 * 6);
    }

    #[test]
    fn test_too_many_convolutions_rejected() {
        let device = Default::default();
        let err = config(vec![4; 8], 1).init::<B>(&device).unwrap_err();
        assert!(matches!(err, ConfigError::ConvolutionTooDeep { .. }));
    }
}

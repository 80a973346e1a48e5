//! Neural Network inference.
//!
//! Networks are loaded from ONNX files and executed on the CPU with [`tract_onnx`].

use std::{fmt, ops::RangeInclusive, path::Path, sync::Arc};

use anyhow::{bail, Context};
use tract_onnx::prelude::{
    Framework, Graph, InferenceModelExt, SimplePlan, TValue, TVec, Tensor, TypedFact, TypedOp,
};

use crate::image::{AsImageView, Color, ImageView, Resolution};

type Model = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// A convolutional neural network (CNN) that operates on image data.
///
/// Like the underlying [`NeuralNetwork`], this is a cheaply [`Clone`]able handle to the underlying
/// data.
#[derive(Clone)]
pub struct Cnn {
    nn: NeuralNetwork,
    shape: CnnInputShape,
    input_res: Resolution,
    color_mapper: ColorMapper,
}

impl Cnn {
    /// Creates a CNN wrapper from a [`NeuralNetwork`].
    ///
    /// The network must have exactly one input, shaped either `[1, 3, H, W]` or `[1, H, W, 3]`.
    pub fn new(nn: NeuralNetwork, color_mapper: ColorMapper) -> anyhow::Result<Self> {
        if nn.num_inputs() != 1 {
            bail!(
                "CNN network has to take exactly 1 input, this one takes {}",
                nn.num_inputs(),
            );
        }

        let input_shape = nn.input_shape(0)?;
        let (shape, input_res) = CnnInputShape::detect(&input_shape)
            .with_context(|| format!("invalid model input shape for CNN: {:?}", input_shape))?;

        log::debug!("loaded {:?} CNN with input resolution {}", shape, input_res);
        Ok(Self {
            nn,
            shape,
            input_res,
            color_mapper,
        })
    }

    /// Returns the expected input image size.
    #[inline]
    pub fn input_resolution(&self) -> Resolution {
        self.input_res
    }

    /// Runs the network on an input image, returning the estimated outputs.
    ///
    /// The input image will be sampled to create the network's input tensor. If the image's aspect
    /// ratio does not match the network's input aspect ratio, the image will be stretched.
    pub fn estimate<V: AsImageView>(&self, image: &V) -> anyhow::Result<Outputs> {
        let data = input_data(image.as_view(), self.shape, self.input_res, &self.color_mapper);
        let tensor = Tensor::from_shape(&self.shape.dims(self.input_res), &data)?;
        self.nn.estimate([tensor])
    }
}

/// Samples `view`, stretched to `res`, into a flat buffer laid out according to `shape`.
fn input_data(
    view: ImageView<'_>,
    shape: CnnInputShape,
    res: Resolution,
    color_mapper: &ColorMapper,
) -> Vec<f32> {
    let (w, h) = (res.width() as usize, res.height() as usize);
    let mut data = vec![0.0; w * h * 3];
    for y in 0..h {
        for x in 0..w {
            let u = (x as f32 + 0.5) / w as f32;
            let v = (y as f32 + 0.5) / h as f32;
            let rgb = color_mapper.map(view.sample(u, v));
            for (c, value) in rgb.into_iter().enumerate() {
                let index = match shape {
                    CnnInputShape::NCHW => c * w * h + y * w + x,
                    CnnInputShape::NHWC => (y * w + x) * 3 + c,
                };
                data[index] = value;
            }
        }
    }
    data
}

#[derive(Debug, Clone)]
enum ColorMapperKind {
    Linear { start: f32, end: f32 },
}

/// Maps image colors to the values a network expects as input.
#[derive(Debug, Clone)]
pub struct ColorMapper {
    kind: ColorMapperKind,
}

impl ColorMapper {
    /// Creates a simple color mapper that uniformly maps sRGB values to `target_range`.
    ///
    /// Note that this operates on *non-linear* sRGB colors, but maps them linearly to the target
    /// range.
    pub fn linear(target_range: RangeInclusive<f32>) -> Self {
        let start = *target_range.start();
        let end = *target_range.end();
        assert!(end > start);

        Self {
            kind: ColorMapperKind::Linear { start, end },
        }
    }

    fn map(&self, color: Color) -> [f32; 3] {
        match self.kind {
            ColorMapperKind::Linear { start, end } => {
                let adjust_range = (end - start) / 255.0;
                [color.r(), color.g(), color.b()].map(|col| col as f32 * adjust_range + start)
            }
        }
    }
}

/// Describes in what order a CNN expects its input image data.
///
/// - `N` is the number of images, fixed at 1.
/// - `C` is the number of color channels, 3 for RGB inputs.
/// - `H` and `W` are the height and width of the input, respectively.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CnnInputShape {
    /// Shape is `[N, C, H, W]`.
    NCHW,
    /// Shape is `[N, H, W, C]`.
    NHWC,
}

impl CnnInputShape {
    /// Determines the layout and input resolution from a network's input tensor shape.
    fn detect(shape: &[usize]) -> Option<(Self, Resolution)> {
        let (layout, w, h) = match *shape {
            [1, 3, h, w] => (Self::NCHW, w, h),
            [1, h, w, 3] => (Self::NHWC, w, h),
            _ => return None,
        };
        let res = Resolution::new(w.try_into().ok()?, h.try_into().ok()?);
        Some((layout, res))
    }

    fn dims(&self, res: Resolution) -> [usize; 4] {
        let (w, h) = (res.width() as usize, res.height() as usize);
        match self {
            Self::NCHW => [1, 3, h, w],
            Self::NHWC => [1, h, w, 3],
        }
    }
}

/// Neural network loader.
pub struct Loader {
    model_data: Vec<u8>,
    outputs: Option<Vec<usize>>,
}

impl Loader {
    /// Only compute the specified outputs during inference.
    ///
    /// This takes a list of network output indices. When called, the [`Outputs`] returned from
    /// [`NeuralNetwork::estimate`] will only contain the chosen output tensors, in the given order.
    pub fn with_output_selection<O>(mut self, outputs: O) -> Self
    where
        O: Into<Vec<usize>>,
    {
        self.outputs = Some(outputs.into());
        self
    }

    /// Loads and optimizes the network.
    ///
    /// Returns an error if the network data is malformed, if the network data is incomplete, or if
    /// the network uses unimplemented operations.
    pub fn load(self) -> anyhow::Result<NeuralNetwork> {
        let graph = tract_onnx::onnx()
            .model_for_read(&mut &*self.model_data)?
            .into_optimized()?;
        let outputs = graph.output_outlets()?;
        let selected_outputs = match self.outputs {
            Some(indices) => indices
                .iter()
                .map(|&i| {
                    outputs.get(i).copied().with_context(|| {
                        format!("network has {} outputs, cannot select #{i}", outputs.len())
                    })
                })
                .collect::<anyhow::Result<Vec<_>>>()?,
            None => outputs.to_vec(),
        };
        let model = SimplePlan::new_for_outputs(graph, &selected_outputs)?;

        Ok(NeuralNetwork(Arc::new(model)))
    }
}

/// A neural network that can be used for inference.
///
/// This is a cheaply [`Clone`]able handle to the underlying network structures.
#[derive(Clone)]
pub struct NeuralNetwork(Arc<Model>);

impl NeuralNetwork {
    /// Loads a pre-trained model from an ONNX file path.
    ///
    /// The path must have a `.onnx` extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Loader> {
        Self::from_path_impl(path.as_ref())
    }

    fn from_path_impl(path: &Path) -> anyhow::Result<Loader> {
        match path.extension() {
            Some(ext) if ext == "onnx" => {}
            _ => bail!(
                "neural network file '{}' must have `.onnx` extension",
                path.display()
            ),
        }

        let model_data = std::fs::read(path)
            .with_context(|| format!("failed to read model file '{}'", path.display()))?;
        Ok(Loader {
            model_data,
            outputs: None,
        })
    }

    /// Returns the number of input nodes of the network.
    pub fn num_inputs(&self) -> usize {
        self.0.model().inputs.len()
    }

    /// Returns the number of output nodes of the network.
    pub fn num_outputs(&self) -> usize {
        self.0.model().outputs.len()
    }

    /// Returns the concrete tensor shape of input `index`.
    pub fn input_shape(&self, index: usize) -> anyhow::Result<Vec<usize>> {
        let fact = self.0.model().input_fact(index)?;
        let shape = fact
            .shape
            .as_concrete()
            .context("network input has a symbolic shape")?;
        Ok(shape.to_vec())
    }

    /// Runs the network on a set of input tensors, returning the estimated [`Outputs`].
    #[doc(alias = "infer")]
    pub fn estimate(&self, inputs: impl IntoIterator<Item = Tensor>) -> anyhow::Result<Outputs> {
        let inputs = inputs
            .into_iter()
            .map(|t| TValue::from_const(Arc::new(t)))
            .collect();
        let inner = self.0.run(inputs)?;
        Ok(Outputs { inner })
    }
}

impl fmt::Debug for NeuralNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NeuralNetwork")
            .field("inputs", &self.num_inputs())
            .field("outputs", &self.num_outputs())
            .finish()
    }
}

/// The result of a neural network inference pass.
///
/// Contains one tensor per network output (or per selected output).
pub struct Outputs {
    inner: TVec<TValue>,
}

impl Outputs {
    /// Returns the number of tensors in this inference output.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the shape of output tensor `index`.
    pub fn shape(&self, index: usize) -> anyhow::Result<&[usize]> {
        Ok(self.tensor(index)?.shape())
    }

    /// Returns the flat `f32` contents of output tensor `index`, in row-major order.
    pub fn data(&self, index: usize) -> anyhow::Result<&[f32]> {
        Ok(self.tensor(index)?.as_slice::<f32>()?)
    }

    fn tensor(&self, index: usize) -> anyhow::Result<&Tensor> {
        let value = self.inner.get(index).with_context(|| {
            format!(
                "network produced {} outputs, output #{index} requested",
                self.inner.len()
            )
        })?;
        Ok(&**value)
    }
}

impl fmt::Debug for Outputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.inner.iter().map(|t| t.shape()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::image::Image;

    use super::*;

    #[test]
    fn detect_layout() {
        assert_eq!(
            CnnInputShape::detect(&[1, 3, 192, 256]),
            Some((CnnInputShape::NCHW, Resolution::new(256, 192)))
        );
        assert_eq!(
            CnnInputShape::detect(&[1, 224, 224, 3]),
            Some((CnnInputShape::NHWC, Resolution::new(224, 224)))
        );
        assert_eq!(CnnInputShape::detect(&[1, 4, 224, 224]), None);
        assert_eq!(CnnInputShape::detect(&[2, 3, 224, 224]), None);
        assert_eq!(CnnInputShape::detect(&[224, 224]), None);
    }

    #[test]
    fn linear_color_mapper() {
        let unit = ColorMapper::linear(0.0..=1.0);
        assert_eq!(unit.map(Color::BLACK), [0.0, 0.0, 0.0]);
        assert_eq!(unit.map(Color::RED), [1.0, 0.0, 0.0]);

        let signed = ColorMapper::linear(-1.0..=1.0);
        assert_eq!(signed.map(Color::WHITE), [1.0, 1.0, 1.0]);
        assert_eq!(signed.map(Color::BLUE), [-1.0, -1.0, 1.0]);
    }

    #[test]
    fn input_layouts() {
        let mut image = Image::new(2, 1);
        image.set(0, 0, Color::RED);
        image.set(1, 0, Color::GREEN);
        let mapper = ColorMapper::linear(0.0..=1.0);
        let res = Resolution::new(2, 1);

        let nchw = input_data(image.as_view(), CnnInputShape::NCHW, res, &mapper);
        assert_eq!(nchw, [1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

        let nhwc = input_data(image.as_view(), CnnInputShape::NHWC, res, &mapper);
        assert_eq!(nhwc, [1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn input_is_stretched() {
        let mut image = Image::new(1, 1);
        image.set(0, 0, Color::GREEN);
        let mapper = ColorMapper::linear(0.0..=1.0);

        let data = input_data(
            image.as_view(),
            CnnInputShape::NHWC,
            Resolution::new(2, 2),
            &mapper,
        );
        assert_eq!(data, [0.0, 1.0, 0.0].repeat(4));
    }

    #[test]
    fn rejects_non_onnx_paths() {
        assert!(NeuralNetwork::from_path("model.tflite").is_err());
        assert!(NeuralNetwork::from_path("does/not/exist.onnx").is_err());
    }
}

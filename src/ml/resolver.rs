// ============================================================
// Layer 5 — Model Resolution
// ============================================================
// Turns the `arch` section of the config into a runnable model
// plus a final activation. Three independent branches:
//
//   user_defined = true   → user namespace, keyed by `type`,
//                           factory receives the whole config
//   input_model_dim = 1   → `namespace.Symbol` split from
//                           `type`, factory receives `arch.args`
//   input_model_dim = 2   → 2D factory named by `type`; an
//                           image-level output (output_model_dim
//                           = 1) attaches the auxiliary head
//                           {pooling: avg, classes: K}
//
// Lookups go through explicit registries filled at start-up;
// an unregistered key is a Configuration error.
//
// 2D encoders are always initialised from scratch and take one
// input channel per selected feature.
//
// Argument checks
// ---------------
// 1D factories read `arch.args` and must agree with the data:
//
//   c_in    == number of selected features
//   c_out   == resolved class count K
//   seq_len == data.length          (when given)
//
// 2D factories read `arch.params`:
//
//   Unet  encoder_depth d, base_channels b
//         H and W divisible by 2^d; b·2^d must fit in a usize
//   FCN   hidden_channels, depth
//
// `encoder_weights` is dropped with a warning.
//
// Multiple outputs
// ----------------
// A network may return several tensors (e.g. mask + image-level
// label with the auxiliary head). The LAST one is the primary
// output; the activation is applied to it alone.

use std::collections::BTreeMap;

use burn::{module::AutodiffModule, prelude::*, tensor::backend::AutodiffBackend};

use crate::domain::config::{ExperimentConfig, ParamReader, Params, ResolvedClasses, Task};
use crate::domain::error::{HarnessError, Result};
use crate::ml::zoo::{
    AuxParams, Fcn2dConfig, Network, PixelClassifierConfig, Pooling, SignalFcnConfig,
    SignalMlpConfig, UnetConfig,
};

// ─── Factories ────────────────────────────────────────────────────────────────
/// 1D model from keyword arguments.
pub type SignalFactory<B> = fn(&Params, &<B as Backend>::Device) -> Result<Network<B>>;

/// 2D model from the arguments derived for a factory call.
pub type SegmentationFactory<B> = fn(&SegmentationArgs, &<B as Backend>::Device) -> Result<Network<B>>;

/// User model from the full config.
pub type UserFactory<B> =
    fn(&ExperimentConfig, ResolvedClasses, &<B as Backend>::Device) -> Result<Network<B>>;

/// Arguments every 2D factory receives.
#[derive(Debug, Clone)]
pub struct SegmentationArgs {
    pub in_channels: usize,
    pub classes:     usize,
    pub aux:         Option<AuxParams>,
    pub params:      Params,
    /// Expected input height and width
    pub input_hw:    [usize; 2],
}

// ─── FinalActivation ──────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalActivation {
    Sigmoid,
    /// Softmax along the given (class) dimension
    Softmax { dim: usize },
    Identity,
}

impl FinalActivation {
    /// Class-labelled tasks get sigmoid for one class and softmax
    /// over channels otherwise; every other task is left as is.
    pub fn for_task(task: &Task, classes: ResolvedClasses) -> Self {
        if !task.is_class_labelled() {
            return FinalActivation::Identity;
        }
        if classes.is_binary() {
            FinalActivation::Sigmoid
        } else {
            FinalActivation::Softmax { dim: 1 }
        }
    }

    pub fn apply<B: Backend>(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        match *self {
            FinalActivation::Sigmoid        => burn::tensor::activation::sigmoid(x),
            FinalActivation::Softmax { dim } => burn::tensor::activation::softmax(x, dim),
            FinalActivation::Identity       => x,
        }
    }
}

// ─── ResolvedModel ────────────────────────────────────────────────────────────
/// The predictive module and its final activation. Read-only
/// during a step; the optimizer replaces `network` between steps.
#[derive(Debug, Clone)]
pub struct ResolvedModel<B: Backend> {
    pub network:    Network<B>,
    pub activation: FinalActivation,
}

impl<B: Backend> ResolvedModel<B> {
    /// Run the network, keep its last output, apply the activation.
    pub fn forward(&self, x: Tensor<B, 4>) -> Result<Tensor<B, 4>> {
        let output = self
            .network
            .forward(x)
            .pop()
            .ok_or_else(|| HarnessError::model(format!("{} produced no output", self.network.kind())))?;
        Ok(self.activation.apply(output))
    }

    pub fn num_params(&self) -> usize {
        self.network.num_params()
    }
}

impl<B: AutodiffBackend> ResolvedModel<B> {
    /// Gradient-free copy for validation and test.
    pub fn valid(&self) -> ResolvedModel<B::InnerBackend> {
        ResolvedModel { network: self.network.valid(), activation: self.activation }
    }
}

// ─── ModelRegistry ────────────────────────────────────────────────────────────
pub struct ModelRegistry<B: Backend> {
    signal:       BTreeMap<String, BTreeMap<String, SignalFactory<B>>>,
    segmentation: BTreeMap<String, SegmentationFactory<B>>,
    user:         BTreeMap<String, UserFactory<B>>,
}

impl<B: Backend> Default for ModelRegistry<B> {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl<B: Backend> ModelRegistry<B> {
    pub fn empty() -> Self {
        Self { signal: BTreeMap::new(), segmentation: BTreeMap::new(), user: BTreeMap::new() }
    }

    /// The zoo and the built-in user models.
    pub fn with_builtins() -> Self {
        let mut reg = Self::empty();
        reg.register_signal("tsai", "FCN", build_signal_fcn::<B>);
        reg.register_signal("tsai", "MLP", build_signal_mlp::<B>);
        reg.register_segmentation("Unet", build_unet::<B>);
        reg.register_segmentation("FCN", build_fcn2d::<B>);
        reg.register_user("PixelClassifier", build_pixel_classifier::<B>);
        reg
    }

    pub fn register_signal(&mut self, namespace: &str, symbol: &str, factory: SignalFactory<B>) {
        self.signal
            .entry(namespace.to_string())
            .or_default()
            .insert(symbol.to_string(), factory);
    }

    pub fn register_segmentation(&mut self, name: &str, factory: SegmentationFactory<B>) {
        self.segmentation.insert(name.to_string(), factory);
    }

    pub fn register_user(&mut self, name: &str, factory: UserFactory<B>) {
        self.user.insert(name.to_string(), factory);
    }

    /// Build the model described by `cfg.arch`.
    pub fn resolve(
        &self,
        cfg:     &ExperimentConfig,
        classes: ResolvedClasses,
        device:  &B::Device,
    ) -> Result<ResolvedModel<B>> {
        let arch = &cfg.arch;

        let network = if arch.user_defined {
            let factory = self.user.get(&arch.kind).ok_or_else(|| {
                HarnessError::config(format!(
                    "unknown user model '{}' (registered: {})",
                    arch.kind, join_keys(self.user.keys())
                ))
            })?;
            factory(cfg, classes, device)?
        } else if arch.input_model_dim == 1 {
            self.resolve_signal(cfg, classes, device)?
        } else if arch.input_model_dim == 2 {
            self.resolve_segmentation(cfg, classes, device)?
        } else {
            return Err(HarnessError::config(format!(
                "arch.input_model_dim must be 1 or 2, got {}",
                arch.input_model_dim
            )));
        };

        let activation = FinalActivation::for_task(&cfg.task, classes);
        tracing::info!(
            "Resolved model '{}' ({} parameters, activation {:?})",
            network.kind(), network.num_params(), activation
        );
        Ok(ResolvedModel { network, activation })
    }

    fn resolve_signal(
        &self,
        cfg:     &ExperimentConfig,
        classes: ResolvedClasses,
        device:  &B::Device,
    ) -> Result<Network<B>> {
        let (namespace, symbol) = cfg.arch.kind.split_once('.').ok_or_else(|| {
            HarnessError::config(format!(
                "1D selector '{}' must have the form namespace.Symbol",
                cfg.arch.kind
            ))
        })?;
        let factory = self
            .signal
            .get(namespace)
            .ok_or_else(|| HarnessError::config(format!("unknown model namespace '{namespace}'")))?
            .get(symbol)
            .ok_or_else(|| {
                HarnessError::config(format!("namespace '{namespace}' has no model '{symbol}'"))
            })?;

        // The keyword arguments go in verbatim; make sure they
        // agree with the data and the resolved class count.
        let args = ParamReader::new(&cfg.arch.args, "arch.args");
        if let Some(c_in) = args.usize("c_in")? {
            if c_in != cfg.in_channels() {
                return Err(HarnessError::config(format!(
                    "arch.args.c_in = {c_in} but {} features are selected",
                    cfg.in_channels()
                )));
            }
        }
        if let Some(c_out) = args.usize("c_out")? {
            if c_out != classes.get() {
                return Err(HarnessError::config(format!(
                    "arch.args.c_out = {c_out} but the resolved class count is {classes}"
                )));
            }
        }
        if let Some(seq_len) = args.usize("seq_len")? {
            if seq_len != cfg.data.length {
                return Err(HarnessError::config(format!(
                    "arch.args.seq_len = {seq_len} but data.length is {}",
                    cfg.data.length
                )));
            }
        }
        factory(&cfg.arch.args, device)
    }

    fn resolve_segmentation(
        &self,
        cfg:     &ExperimentConfig,
        classes: ResolvedClasses,
        device:  &B::Device,
    ) -> Result<Network<B>> {
        let factory = self.segmentation.get(&cfg.arch.kind).ok_or_else(|| {
            HarnessError::config(format!(
                "unknown architecture '{}' (registered: {})",
                cfg.arch.kind, join_keys(self.segmentation.keys())
            ))
        })?;

        let aux = match cfg.arch.output_model_dim {
            1 => Some(AuxParams::new(Pooling::Avg, classes.get())),
            2 => None,
            other => {
                return Err(HarnessError::config(format!(
                    "arch.output_model_dim must be 1 or 2, got {other}"
                )))
            }
        };

        let mut params = cfg.arch.params.clone();
        if params.remove("encoder_weights").is_some_and(|w| !w.is_null()) {
            tracing::warn!("Ignoring arch.params.encoder_weights: encoders start from scratch");
        }

        let args = SegmentationArgs {
            in_channels: cfg.in_channels(),
            classes:     classes.get(),
            aux,
            params,
            input_hw:    [cfg.data.height, cfg.data.width],
        };
        factory(&args, device)
    }
}

fn join_keys<'a>(keys: impl Iterator<Item = &'a String>) -> String {
    keys.map(String::as_str).collect::<Vec<_>>().join(", ")
}

// ─── Built-in factories ───────────────────────────────────────────────────────
fn build_signal_fcn<B: Backend>(args: &Params, device: &B::Device) -> Result<Network<B>> {
    let r = ParamReader::new(args, "arch.args");
    let layers       = r.usize_list_or("layers", &[128, 256, 128])?;
    let kernel_sizes = r.usize_list_or("kernel_sizes", &[7, 5, 3])?;
    if layers.is_empty() || layers.len() != kernel_sizes.len() {
        return Err(HarnessError::config(
            "arch.args.layers and arch.args.kernel_sizes must be non-empty and of equal length",
        ));
    }
    if kernel_sizes.iter().any(|k| k % 2 == 0) {
        return Err(HarnessError::config("arch.args.kernel_sizes must be odd"));
    }
    let cfg = SignalFcnConfig::new(r.require_usize("c_in")?, r.require_usize("c_out")?, layers, kernel_sizes);
    Ok(cfg.init(device).into())
}

fn build_signal_mlp<B: Backend>(args: &Params, device: &B::Device) -> Result<Network<B>> {
    let r = ParamReader::new(args, "arch.args");
    let cfg = SignalMlpConfig::new(
        r.require_usize("c_in")?,
        r.require_usize("c_out")?,
        r.require_usize("seq_len")?,
        r.usize_list_or("layers", &[128, 64])?,
    );
    Ok(cfg.init(device).into())
}

fn build_unet<B: Backend>(args: &SegmentationArgs, device: &B::Device) -> Result<Network<B>> {
    let r = ParamReader::new(&args.params, "arch.params");
    let depth = r.usize_or("encoder_depth", 2)?;
    let base  = r.usize_or("base_channels", 16)?;
    if base == 0 {
        return Err(HarnessError::config("arch.params.base_channels must be > 0"));
    }
    let stride = u32::try_from(depth)
        .ok()
        .and_then(|d| 1usize.checked_shl(d))
        .filter(|stride| base.checked_mul(*stride).is_some())
        .ok_or_else(|| HarnessError::config(format!("arch.params.encoder_depth {depth} is too deep")))?;
    let [h, w] = args.input_hw;
    if h % stride != 0 || w % stride != 0 {
        return Err(HarnessError::config(format!(
            "Unet with encoder_depth {depth} needs height and width divisible by {stride}, got {h}x{w}"
        )));
    }
    let cfg = UnetConfig::new(args.in_channels, args.classes, depth, base).with_aux(args.aux.clone());
    Ok(cfg.init(device).into())
}

fn build_fcn2d<B: Backend>(args: &SegmentationArgs, device: &B::Device) -> Result<Network<B>> {
    let r = ParamReader::new(&args.params, "arch.params");
    let cfg = Fcn2dConfig::new(
        args.in_channels,
        args.classes,
        r.usize_or("hidden_channels", 16)?,
        r.usize_or("depth", 2)?,
    )
    .with_aux(args.aux.clone());
    Ok(cfg.init(device).into())
}

fn build_pixel_classifier<B: Backend>(
    cfg:     &ExperimentConfig,
    classes: ResolvedClasses,
    device:  &B::Device,
) -> Result<Network<B>> {
    let model = PixelClassifierConfig::new(cfg.in_channels(), classes.get(), cfg.image_level_output())
        .init(device);
    Ok(model.into())
}

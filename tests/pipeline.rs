// End-to-end runs of the harness on tiny synthetic experiments.

use std::{fs, path::Path};

use burn::backend::{Autodiff, NdArray};
use segharness::{
    application::train_use_case::run_experiment,
    domain::{error::HarnessError, mode::Mode},
    infra::{
        experiment::{bootstrap, Experiment},
        run_log::MemorySink,
    },
    ml::resolver::ModelRegistry,
};

type TestBackend = Autodiff<NdArray<f32>>;

const SEGMENTATION: &str = r#"
task: Segmentation
data:
  num_classes: 3
  features_selected: [red, green, blue]
  num_samples: 12
  height: 8
  width: 8
arch:
  user_defined: false
  type: Unet
  input_model_dim: 2
  output_model_dim: 2
  params:
    encoder_depth: 1
    base_channels: 4
implementation:
  loss:
    type: CrossEntropyLoss
    params:
      weight: [1.0, 1.0, 2.0]
    masked: true
  metrics: [accuracy, iou]
  optimizer:
    lr: 0.01
    weight_decay: 0.0001
  trainer:
    batch_size: 4
    epochs: 2
    seed: 7
    monitor:
      metric: iou
"#;

const SIGNAL: &str = r#"
task: Classification
data:
  num_classes: 2
  features_selected: [accel_x, accel_y]
  num_samples: 10
  length: 16
arch:
  user_defined: false
  type: tsai.FCN
  input_model_dim: 1
  output_model_dim: 1
  args:
    c_in: 2
    c_out: 1
    layers: [8, 8]
    kernel_sizes: [5, 3]
implementation:
  loss:
    type: BCELoss
    params: {}
    masked: false
  metrics: [accuracy, f1]
  optimizer:
    lr: 0.01
    weight_decay: 0.0
  trainer:
    batch_size: 4
    epochs: 1
    monitor:
      metric: f1
"#;

fn experiment(dir: &Path, yaml: &str) -> Experiment {
    let yaml = format!("save_path: {}\n{yaml}", dir.join("runs").display());
    let path = dir.join("config.yaml");
    fs::write(&path, yaml).unwrap();
    bootstrap(&path, Some("test".into())).unwrap()
}

fn run(exp: &Experiment, sink: &MemorySink) -> anyhow::Result<segharness::application::train_use_case::TrainReport> {
    let mut handle = sink.clone();
    run_experiment::<TestBackend>(exp, &ModelRegistry::with_builtins(), &Default::default(), &mut handle)
}

#[test]
fn segmentation_fit_validate_test() {
    let tmp  = tempfile::tempdir().unwrap();
    let exp  = experiment(tmp.path(), SEGMENTATION);
    let sink = MemorySink::default();

    let report = run(&exp, &sink).unwrap();

    // 12 samples → 8 / 2 / 2, two training batches per epoch
    assert_eq!((report.train_samples, report.val_samples, report.test_samples), (8, 2, 2));
    assert_eq!(report.global_step, 4);

    assert_eq!(
        sink.closed_epochs(),
        vec![Mode::Train, Mode::Val, Mode::Train, Mode::Val, Mode::Test]
    );

    let train_loss = sink.entries_for("train_loss");
    assert_eq!(train_loss.len(), 4);
    assert!(train_loss.iter().all(|e| e.prog_bar && e.on_step && e.value.is_finite() && e.value >= 0.0));
    assert!(sink.entries_for("val_loss").iter().all(|e| !e.prog_bar));
    assert_eq!(sink.entries_for("test_loss").len(), 1);

    let val_iou = sink.entries_for("val_iou");
    assert_eq!(val_iou.len(), 2);
    assert!(val_iou.iter().all(|e| e.prog_bar && !e.on_step && (0.0..=1.0).contains(&e.value)));
    assert!(sink.entries_for("train_accuracy").iter().all(|e| !e.prog_bar));
    assert_eq!(sink.entries_for("test_accuracy").len(), 1);

    let groups = sink.groups();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups.iter().map(|g| g.step).collect::<Vec<_>>(), vec![2, 4]);
    for g in &groups {
        assert_eq!(g.values.len(), 2);
        assert_eq!(g.values[0].0, "train_loss");
        assert_eq!(g.values[1].0, "val_loss");
    }

    let latest = fs::read_to_string(exp.checkpoint_dir().join("latest_epoch.json")).unwrap();
    assert_eq!(latest.trim(), "2");
    assert!(exp.dir.join("config.yaml").exists());
}

#[test]
fn binary_signal_classification() {
    let tmp  = tempfile::tempdir().unwrap();
    let exp  = experiment(tmp.path(), SIGNAL);
    let sink = MemorySink::default();

    let report = run(&exp, &sink).unwrap();
    assert_eq!(report.global_step, 2);

    let f1 = sink.entries_for("val_f1");
    assert_eq!(f1.len(), 1);
    assert!(f1[0].prog_bar);
    assert!(sink.entries_for("train_loss").iter().all(|e| e.value.is_finite()));
}

#[test]
fn unknown_architecture_fails_before_training() {
    let tmp  = tempfile::tempdir().unwrap();
    let exp  = experiment(tmp.path(), &SEGMENTATION.replace("type: Unet", "type: PSPNet"));
    let sink = MemorySink::default();

    let err = run(&exp, &sink).unwrap_err();
    let fatal = err
        .chain()
        .filter_map(|e| e.downcast_ref::<HarnessError>())
        .any(HarnessError::is_fatal_at_setup);
    assert!(fatal);
    assert!(sink.entries().is_empty());
}

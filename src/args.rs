// 该文件是 Chestpa （胸片体位） 项目的一部分。
// src/args.rs - 命令行参数
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::PathBuf;

use clap::Args;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

use crate::evaluator::{Locale, PoseEvaluator, RollCue, Thresholds, ThresholdsError};

/// 输入、模型与输出地址
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
  /// 姿态估计器: landmarks:///path/to/recording.jsonl 或 onnx:///path/to/model.onnx
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源: image://、folder://、gst://camera、gst://file
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径: image://、folder://、gst://display、gst://file
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
}

/// 判定阈值与文案语言
#[derive(Args, Debug, Clone, Default)]
pub struct EvaluatorArgs {
  /// TOML 阈值文件，未给出的字段使用默认值
  #[arg(long, value_name = "FILE")]
  pub thresholds: Option<PathBuf>,
  /// 文案语言: th 或 en
  #[arg(long, value_name = "LOCALE", default_value = "th")]
  pub locale: Locale,
  /// 肩部前倾线索: depth 或 elbow-spread
  #[arg(long, value_name = "CUE")]
  pub roll_cue: Option<RollCue>,
  /// 关键点最低可见度 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD")]
  pub min_visibility: Option<f32>,
}

impl EvaluatorArgs {
  /// 默认值，然后是阈值文件，最后是命令行参数
  pub fn thresholds(&self) -> Result<Thresholds, ThresholdsError> {
    let mut thresholds = match &self.thresholds {
      Some(path) => {
        info!("读取阈值文件: {}", path.display());
        Thresholds::load(path)?
      }
      None => Thresholds::default(),
    };
    if let Some(roll_cue) = self.roll_cue {
      thresholds = thresholds.with_roll_cue(roll_cue);
    }
    if let Some(min_visibility) = self.min_visibility {
      thresholds = thresholds.with_min_visibility(min_visibility);
    }
    thresholds.validate()
  }

  pub fn evaluator(&self) -> Result<PoseEvaluator, ThresholdsError> {
    let thresholds = self.thresholds()?;
    info!("判定阈值: {:?}", thresholds);
    Ok(PoseEvaluator::new(thresholds, self.locale))
  }
}

/// 日志级别由 RUST_LOG 控制，默认 info
pub fn init_tracing() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::Parser;

  #[derive(Parser)]
  struct Cli {
    #[command(flatten)]
    pipeline: PipelineArgs,
    #[command(flatten)]
    evaluator: EvaluatorArgs,
  }

  const PIPELINE: [&str; 7] = [
    "chestpa",
    "--model",
    "landmarks:///tmp/poses.jsonl",
    "--input",
    "image:///tmp/in.png",
    "--output",
    "image:///tmp/out.png",
  ];

  #[test]
  fn defaults_without_overrides() {
    let cli = Cli::try_parse_from(PIPELINE).unwrap();
    assert_eq!(cli.pipeline.model.scheme(), "landmarks");
    assert_eq!(cli.evaluator.locale, Locale::Thai);
    assert_eq!(cli.evaluator.thresholds().unwrap(), Thresholds::default());
  }

  #[test]
  fn command_line_overrides_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("thresholds.toml");
    std::fs::write(
      &path,
      "min_visibility = 0.3\nshoulder_level_tolerance = 0.08\nroll_cue = \"elbow_spread\"\n",
    )
    .unwrap();

    let path_arg = path.display().to_string();
    let mut argv = PIPELINE.to_vec();
    argv.extend([
      "--thresholds",
      path_arg.as_str(),
      "--roll-cue",
      "depth",
      "--locale",
      "en",
    ]);
    let cli = Cli::try_parse_from(argv).unwrap();
    let thresholds = cli.evaluator.thresholds().unwrap();

    assert_eq!(thresholds.shoulder_level_tolerance, 0.08);
    assert_eq!(thresholds.min_visibility, 0.3);
    assert_eq!(thresholds.roll_cue, RollCue::Depth);
    assert_eq!(cli.evaluator.evaluator().unwrap().locale(), Locale::English);
  }

  #[test]
  fn out_of_range_visibility_flag_is_rejected() {
    let mut argv = PIPELINE.to_vec();
    argv.extend(["--min-visibility", "1.5"]);
    let cli = Cli::try_parse_from(argv).unwrap();
    assert!(matches!(
      cli.evaluator.thresholds(),
      Err(ThresholdsError::Invalid {
        field: "min_visibility",
        ..
      })
    ));
  }

  #[test]
  fn unknown_locale_is_rejected() {
    let mut argv = PIPELINE.to_vec();
    argv.extend(["--locale", "fr"]);
    assert!(Cli::try_parse_from(argv).is_err());
  }
}

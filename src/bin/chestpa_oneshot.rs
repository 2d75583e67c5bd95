// 该文件是 Chestpa （胸片体位） 项目的一部分。
// src/bin/chestpa_oneshot.rs - 单帧体位判定
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

use anyhow::Result;
use clap::Parser;

use chestpa::{
  FromUrl,
  args::{EvaluatorArgs, PipelineArgs, init_tracing},
  input::InputWrapper,
  model::ModelWrapper,
  output::OutputWrapper,
  task::{OneShotTask, Task},
};
use tracing::info;

/// 对第一帧做一次体位判定
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub pipeline: PipelineArgs,
  #[command(flatten)]
  pub evaluator: EvaluatorArgs,
}

fn main() -> Result<()> {
  init_tracing();

  let args = Args::parse();

  info!("模型: {}", args.pipeline.model);
  info!("输入来源: {}", args.pipeline.input);
  info!("输出路径: {}", args.pipeline.output);

  let evaluator = args.evaluator.evaluator()?;
  let input = InputWrapper::from_url(&args.pipeline.input)?;
  let model = ModelWrapper::from_url(&args.pipeline.model)?;
  let output = OutputWrapper::from_url_with_visibility(
    &args.pipeline.output,
    evaluator.thresholds().min_visibility,
  )?;

  OneShotTask::new(evaluator).run_task(input, model, output)?;

  Ok(())
}

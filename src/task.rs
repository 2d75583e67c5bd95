// 该文件是 Chestpa （胸片体位） 项目的一部分。
// src/task.rs - 任务循环
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

use std::{
  sync::mpsc::{Receiver, channel},
  thread,
  time::{Duration, Instant},
};
use tracing::{debug, info, warn};

use crate::{
  evaluator::{Criterion, FeedbackReport, Outcome, PoseEvaluator},
  landmark::LandmarkSet,
  model::{Assessment, Model, assess},
  output::Render,
};

const DEFAULT_REPEAT_TIMES: usize = 1000;
const WARMUP_ROUNDS: usize = 2;
const FORCE_EXIT_AFTER: Duration = Duration::from_secs(30);

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

fn log_report(report: &FeedbackReport) {
  for item in report.iter() {
    info!("{}", item);
  }
}

pub struct OneShotTask {
  evaluator: PoseEvaluator,
}

impl OneShotTask {
  pub fn new(evaluator: PoseEvaluator) -> Self {
    Self { evaluator }
  }
}

impl<
  F,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = Option<LandmarkSet>, Error = ME>,
  O: Render<F, Assessment, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");

    let now = Instant::now();
    let detection = model.infer(&frame)?;
    info!("推理完成，耗时: {:.2?}", now.elapsed());

    let now = Instant::now();
    let assessment = assess(&self.evaluator, detection);
    info!("判定完成，耗时: {:.2?}", now.elapsed());
    log_report(&assessment.report);

    let now = Instant::now();
    output.render_result(&frame, &assessment)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

/// 重复推理的平均耗时
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySummary {
  pub rounds: usize,
  pub estimator: Duration,
  pub evaluator: Duration,
}

/// 跳过预热轮次后的平均值；轮次不足时使用全部样本
fn mean_latency(times: &[Duration]) -> Duration {
  let samples = if times.len() > WARMUP_ROUNDS {
    &times[WARMUP_ROUNDS..]
  } else {
    times
  };
  if samples.is_empty() {
    return Duration::ZERO;
  }
  samples.iter().sum::<Duration>() / samples.len() as u32
}

pub struct RepeatShotTask {
  evaluator: PoseEvaluator,
  repeat: usize,
}

impl RepeatShotTask {
  pub fn new(evaluator: PoseEvaluator) -> Self {
    Self {
      evaluator,
      repeat: DEFAULT_REPEAT_TIMES,
    }
  }

  pub fn with_repeat(mut self, repeat: usize) -> Self {
    self.repeat = repeat.max(1);
    self
  }

  fn benchmark<F, M, O>(&self, frame: &F, model: &M, output: &O) -> anyhow::Result<LatencySummary>
  where
    M: Model<Input = F, Output = Option<LandmarkSet>>,
    M::Error: std::error::Error + Sync + Send + 'static,
    O: Render<F, Assessment>,
    O::Error: std::error::Error + Sync + Send + 'static,
  {
    let mut estimator_times = Vec::with_capacity(self.repeat);
    let mut evaluator_times = Vec::with_capacity(self.repeat);
    for i in 0..self.repeat {
      let now = Instant::now();
      let detection = model.infer(frame)?;
      let estimated = now.elapsed();

      let now = Instant::now();
      let assessment = assess(&self.evaluator, detection);
      let evaluated = now.elapsed();

      output.render_result(frame, &assessment)?;
      debug!(
        "({})推理耗时: {:.2?}，判定耗时: {:.2?}",
        i, estimated, evaluated
      );
      estimator_times.push(estimated);
      evaluator_times.push(evaluated);
    }

    Ok(LatencySummary {
      rounds: self.repeat,
      estimator: mean_latency(&estimator_times),
      evaluator: mean_latency(&evaluator_times),
    })
  }
}

impl<
  F,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = Option<LandmarkSet>, Error = ME>,
  O: Render<F, Assessment, Error = RE>,
> Task<I, M, O> for RepeatShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，重复 {} 次...", self.repeat);

    let summary = self.benchmark(&frame, &model, &output)?;
    warn!(
      "{} 轮平均推理时间: {:.2?}，平均判定时间: {:.2?}",
      summary.rounds, summary.estimator, summary.evaluator
    );

    Ok(())
  }
}

/// 连续任务结束时的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
  pub frames: usize,
  pub no_pose_frames: usize,
  pub all_passed_frames: usize,
}

#[derive(Debug)]
pub struct ContinuousTask {
  evaluator: PoseEvaluator,
  frame_number: Option<usize>,
}

impl ContinuousTask {
  pub fn new(evaluator: PoseEvaluator) -> Self {
    Self {
      evaluator,
      frame_number: None,
    }
  }

  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  fn run_frames<F, I, M, O>(
    &self,
    input: I,
    model: &M,
    output: &O,
    stop: &Receiver<()>,
  ) -> anyhow::Result<SessionSummary>
  where
    I: Iterator<Item = F>,
    M: Model<Input = F, Output = Option<LandmarkSet>>,
    M::Error: std::error::Error + Sync + Send + 'static,
    O: Render<F, Assessment>,
    O::Error: std::error::Error + Sync + Send + 'static,
  {
    let mut summary = SessionSummary::default();
    let mut last_outcomes: Option<Vec<(Criterion, Outcome)>> = None;
    let mut now = Instant::now();

    for frame in input {
      summary.frames += 1;
      debug!("处理第 {} 帧图像", summary.frames);

      let detection = model.infer(&frame)?;
      let elapsed_a = now.elapsed();
      let assessment = assess(&self.evaluator, detection);
      let elapsed_b = now.elapsed();
      output.render_result(&frame, &assessment)?;
      let elapsed_c = now.elapsed();
      now = Instant::now();
      debug!(
        "推理/判定/渲染完成，耗时: {:.2?} / {:.2?} / {:.2?}",
        elapsed_a, elapsed_b, elapsed_c
      );

      if !assessment.detected() {
        summary.no_pose_frames += 1;
      } else if assessment.report.all_passed() {
        summary.all_passed_frames += 1;
      }

      // 只在判定结论变化时输出
      let outcomes = assessment.report.outcomes();
      if last_outcomes.as_ref() != Some(&outcomes) {
        info!("第 {} 帧判定结果变化:", summary.frames);
        log_report(&assessment.report);
        last_outcomes = Some(outcomes);
      }

      if self.frame_number.is_some_and(|n| summary.frames >= n) {
        info!("达到指定帧数 {}, 退出任务循环", summary.frames);
        break;
      }
      if stop.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    Ok(summary)
  }
}

impl<
  F,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = Option<LandmarkSet>, Error = ME>,
  O: Render<F, Assessment, Error = RE>,
> Task<I, M, O> for ContinuousTask
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let (tx, rx) = channel();

    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(FORCE_EXIT_AFTER);
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })?;

    let summary = self.run_frames(input, &model, &output, &rx)?;
    info!(
      "任务完成: 共 {} 帧，{} 帧未检测到人体，{} 帧全部通过",
      summary.frames, summary.no_pose_frames, summary.all_passed_frames
    );
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    evaluator::fixtures::ideal_pose,
    landmark::{BodyLandmark, Landmark},
  };
  use std::{
    cell::{Cell, RefCell},
    convert::Infallible,
    rc::Rc,
  };

  /// 输入为帧序号，按序号取出预置的检测结果
  struct ScriptedModel {
    poses: Vec<Option<LandmarkSet>>,
    calls: Cell<usize>,
  }

  impl ScriptedModel {
    fn new(poses: Vec<Option<LandmarkSet>>) -> Self {
      Self {
        poses,
        calls: Cell::new(0),
      }
    }
  }

  impl Model for ScriptedModel {
    type Input = usize;
    type Output = Option<LandmarkSet>;
    type Error = Infallible;

    fn infer(&self, input: &usize) -> Result<Self::Output, Self::Error> {
      self.calls.set(self.calls.get() + 1);
      Ok(self.poses.get(*input).cloned().flatten())
    }
  }

  #[derive(Clone, Default)]
  struct CollectingRender {
    rendered: Rc<RefCell<Vec<(usize, FeedbackReport)>>>,
  }

  impl Render<usize, Assessment> for CollectingRender {
    type Error = Infallible;

    fn render_result(&self, frame: &usize, result: &Assessment) -> Result<(), Self::Error> {
      self
        .rendered
        .borrow_mut()
        .push((*frame, result.report.clone()));
      Ok(())
    }
  }

  fn tilted_pose() -> LandmarkSet {
    let mut pose = ideal_pose();
    let shoulder = *pose.get(BodyLandmark::LeftShoulder).unwrap();
    pose.insert(
      BodyLandmark::LeftShoulder,
      Landmark {
        y: shoulder.y + 0.2,
        ..shoulder
      },
    );
    pose
  }

  #[test]
  fn one_shot_renders_first_frame_only() {
    let output = CollectingRender::default();
    OneShotTask::new(PoseEvaluator::default())
      .run_task(
        0..3usize,
        ScriptedModel::new(vec![Some(ideal_pose())]),
        output.clone(),
      )
      .unwrap();

    let rendered = output.rendered.borrow();
    assert_eq!(rendered.len(), 1);
    assert_eq!(rendered[0].0, 0);
    assert!(rendered[0].1.all_passed());
  }

  #[test]
  fn one_shot_without_frames_fails() {
    let result = OneShotTask::new(PoseEvaluator::default()).run_task(
      std::iter::empty::<usize>(),
      ScriptedModel::new(vec![]),
      CollectingRender::default(),
    );
    assert!(result.is_err());
  }

  #[test]
  fn repeat_shot_runs_requested_rounds() {
    let output = CollectingRender::default();
    let model = ScriptedModel::new(vec![None]);
    let task = RepeatShotTask::new(PoseEvaluator::default()).with_repeat(5);
    let summary = task.benchmark(&0usize, &model, &output).unwrap();

    assert_eq!(summary.rounds, 5);
    assert_eq!(model.calls.get(), 5);
    let rendered = output.rendered.borrow();
    assert_eq!(rendered.len(), 5);
    assert!(rendered.iter().all(|(_, report)| report.is_no_pose()));
  }

  #[test]
  fn mean_latency_skips_warmup() {
    let times = [
      Duration::from_millis(100),
      Duration::from_millis(50),
      Duration::from_millis(2),
      Duration::from_millis(4),
    ];
    assert_eq!(mean_latency(&times), Duration::from_millis(3));
    assert_eq!(
      mean_latency(&times[..2]),
      Duration::from_millis(75)
    );
    assert_eq!(mean_latency(&[]), Duration::ZERO);
  }

  #[test]
  fn continuous_counts_frames_by_outcome() {
    let poses = vec![
      Some(ideal_pose()),
      None,
      Some(tilted_pose()),
      Some(ideal_pose()),
      None,
    ];
    let output = CollectingRender::default();
    let (_tx, rx) = channel();
    let summary = ContinuousTask::new(PoseEvaluator::default())
      .run_frames(0..poses.len(), &ScriptedModel::new(poses), &output, &rx)
      .unwrap();

    assert_eq!(
      summary,
      SessionSummary {
        frames: 5,
        no_pose_frames: 2,
        all_passed_frames: 2,
      }
    );
    assert_eq!(output.rendered.borrow().len(), 5);
  }

  #[test]
  fn continuous_stops_at_frame_number() {
    let output = CollectingRender::default();
    let (_tx, rx) = channel();
    let summary = ContinuousTask::new(PoseEvaluator::default())
      .with_frame_number(Some(3))
      .run_frames(0..10usize, &ScriptedModel::new(vec![]), &output, &rx)
      .unwrap();
    assert_eq!(summary.frames, 3);
    assert_eq!(summary.no_pose_frames, 3);
  }

  #[test]
  fn continuous_stops_on_interrupt() {
    let (tx, rx) = channel();
    tx.send(()).unwrap();
    let summary = ContinuousTask::new(PoseEvaluator::default())
      .run_frames(
        0..10usize,
        &ScriptedModel::new(vec![]),
        &CollectingRender::default(),
        &rx,
      )
      .unwrap();
    assert_eq!(summary.frames, 1);
  }
}

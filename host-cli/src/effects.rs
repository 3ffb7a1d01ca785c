//! # Effects 模块
//!
//! 终端宿主没有真实的音频、镜头和角色表现，效果请求只记录日志，
//! 被跟踪的效果按队列顺序回报完成（可选按请求时长实际等待）。

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use dialogue_runtime::{
    DialogueDriver, DialogueError, DriverState, EffectId, EffectRequest, Event, EventBus,
    Subscription,
};
use tracing::{debug, info, warn};

use crate::config::EffectsConfig;

/// 效果模拟器
pub struct EffectSimulator {
    queue: Rc<RefCell<VecDeque<(EffectId, Duration)>>>,
    simulate_durations: bool,
    max_duration: Duration,
    _subscription: Subscription,
}

impl EffectSimulator {
    /// 订阅事件总线
    pub fn attach(bus: &EventBus, config: &EffectsConfig) -> Self {
        let queue: Rc<RefCell<VecDeque<(EffectId, Duration)>>> = Rc::default();
        let sink = queue.clone();

        let subscription = bus.subscribe_all(move |event| match event {
            Event::Effect { id, request } => {
                info!(kind = ?request.kind(), id = ?id, "{}", describe_effect(request));
                if let Some(id) = id {
                    sink.borrow_mut().push_back((*id, request.duration()));
                }
            }
            Event::EffectCancelled { id, .. } => {
                debug!(effect_id = id, "效果已取消");
                sink.borrow_mut().retain(|(queued, _)| queued != id);
            }
            _ => {}
        });

        Self {
            queue,
            simulate_durations: config.simulate_durations,
            max_duration: Duration::try_from_secs_f32(config.max_simulated_secs)
                .unwrap_or_default(),
            _subscription: subscription,
        }
    }

    /// 排队中的效果数量
    pub fn queued(&self) -> usize {
        self.queue.borrow().len()
    }

    /// 依次完成效果，直到驱动器离开 `Running`
    pub fn settle(&mut self, driver: &mut DialogueDriver) -> Result<DriverState, DialogueError> {
        while driver.state() == DriverState::Running {
            let next = self.queue.borrow_mut().pop_front();
            let id = match next {
                Some((id, duration)) => {
                    self.wait(duration);
                    id
                }
                None => {
                    let Some(id) = driver.pending_effects().into_iter().next() else {
                        warn!("驱动器仍在执行，但没有可完成的效果");
                        break;
                    };
                    id
                }
            };
            driver.complete_effect(id)?;
        }
        Ok(driver.state())
    }

    fn wait(&self, duration: Duration) {
        if self.simulate_durations {
            std::thread::sleep(duration.min(self.max_duration));
        }
    }
}

/// 效果的简短描述
pub fn describe_effect(request: &EffectRequest) -> String {
    match request {
        EffectRequest::PlayAudio {
            clip,
            channel,
            looping,
            ..
        } => {
            let suffix = if *looping { "（循环）" } else { "" };
            format!("播放音频 {clip} [{channel:?}]{suffix}")
        }
        EffectRequest::StopAudio { channel, .. } => format!("停止音频 [{channel:?}]"),
        EffectRequest::MoveCamera { x, y, zoom, .. } => match zoom {
            Some(zoom) => format!("镜头移动到 ({x}, {y}) 缩放 {zoom}"),
            None => format!("镜头移动到 ({x}, {y})"),
        },
        EffectRequest::Character {
            name,
            action,
            position,
            ..
        } => match position {
            Some(position) => format!("{name} {action:?} {position:?}"),
            None => format!("{name} {action:?}"),
        },
        EffectRequest::Delay { secs } => format!("等待 {secs} 秒"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dialogue_runtime::{AudioChannel, Graph};

    const EFFECT_GRAPH: &str = r#"{
        "id": "fx", "entry": "A",
        "nodes": [
            { "id": "A", "type": "effects", "wait": true, "next": "B", "effects": [
                { "kind": "play_audio", "clip": "rain.ogg", "channel": "bgm", "fade_secs": 5.0 },
                { "kind": "delay", "secs": 3.0 }
            ]},
            { "id": "B", "type": "line", "text": "雨停了。", "next": "E" },
            { "id": "E", "type": "end" }
        ]
    }"#;

    #[test]
    fn test_settle_completes_tracked_effects() {
        let mut driver = DialogueDriver::new(None);
        let mut simulator = EffectSimulator::attach(driver.events(), &EffectsConfig::default());

        let graph = Rc::new(Graph::from_json(EFFECT_GRAPH).unwrap());
        assert_eq!(driver.start_dialogue(graph).unwrap(), DriverState::Running);
        assert_eq!(simulator.queued(), 2);

        assert_eq!(
            simulator.settle(&mut driver).unwrap(),
            DriverState::AwaitingInput
        );
        assert_eq!(driver.current_node_id(), Some("B"));
        assert_eq!(simulator.queued(), 0);
        assert!(driver.pending_effects().is_empty());
    }

    #[test]
    fn test_cancelled_effects_leave_queue() {
        let mut driver = DialogueDriver::new(None);
        let simulator = EffectSimulator::attach(driver.events(), &EffectsConfig::default());

        driver
            .start_dialogue(Rc::new(Graph::from_json(EFFECT_GRAPH).unwrap()))
            .unwrap();
        driver.skip().unwrap();

        assert_eq!(driver.state(), DriverState::AwaitingInput);
        assert_eq!(simulator.queued(), 0);
    }

    #[test]
    fn test_settle_is_noop_when_not_running() {
        let mut driver = DialogueDriver::new(None);
        let mut simulator = EffectSimulator::attach(driver.events(), &EffectsConfig::default());
        assert_eq!(simulator.settle(&mut driver).unwrap(), DriverState::Idle);
    }

    #[test]
    fn test_describe_effect() {
        let request = EffectRequest::PlayAudio {
            clip: "theme.ogg".to_string(),
            channel: AudioChannel::Bgm,
            fade_secs: 0.0,
            looping: true,
        };
        assert_eq!(describe_effect(&request), "播放音频 theme.ogg [Bgm]（循环）");
        assert_eq!(
            describe_effect(&EffectRequest::Delay { secs: 1.5 }),
            "等待 1.5 秒"
        );
    }
}

//! # Console 模块
//!
//! 终端交互循环：打印台词和选项，读取玩家命令并转交给驱动器。
//!
//! ## 命令
//!
//! | 输入 | 作用 |
//! |------|------|
//! | 回车 | 继续 |
//! | 数字 | 选择对应选项（从 1 开始） |
//! | `skip` | 跳过当前等待 |
//! | `save N` / `load N` | 存档 / 读档到槽位 N |
//! | `save` | 存档到第一个空槽位 |
//! | `history` | 回看最近的台词 |
//! | `quit` | 退出 |

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::rc::Rc;

use anyhow::Context;
use dialogue_runtime::{
    DialogueDriver, DialogueGraph, DialogueInput, DriverState, EndReason, Event, HistoryEvent,
    PersistenceError, SessionPersistence, Subscription,
};
use tracing::{debug, info};

use crate::config::EffectsConfig;
use crate::effects::{EffectSimulator, describe_effect};
use crate::save_storage::{FileStorage, MAX_SAVE_SLOTS, slot_key};

/// 回看显示的台词数
const HISTORY_LINES: usize = 10;

/// 玩家命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Continue,
    /// 可见选项序号（从 0 开始）
    Choose(usize),
    Skip,
    /// 未指定槽位时使用第一个空槽位
    Save(Option<u32>),
    Load(u32),
    History,
    Quit,
    Unknown(String),
}

impl ConsoleCommand {
    /// 解析一行输入
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let mut parts = line.split_whitespace();
        let (Some(head), rest) = (parts.next(), parts.next()) else {
            return Self::Continue;
        };
        let extra = parts.next().is_some();

        match (head.to_ascii_lowercase().as_str(), rest, extra) {
            ("skip", None, false) => Self::Skip,
            ("history", None, false) => Self::History,
            ("quit" | "exit" | "q", None, false) => Self::Quit,
            ("save", None, false) => Self::Save(None),
            ("save", Some(slot), false) => slot
                .parse()
                .map(|slot| Self::Save(Some(slot)))
                .unwrap_or_else(|_| Self::Unknown(line.to_string())),
            ("load", Some(slot), false) => slot
                .parse()
                .map(Self::Load)
                .unwrap_or_else(|_| Self::Unknown(line.to_string())),
            (number, None, false) => match number.parse::<usize>() {
                Ok(n) if n >= 1 => Self::Choose(n - 1),
                _ => Self::Unknown(line.to_string()),
            },
            _ => Self::Unknown(line.to_string()),
        }
    }
}

/// 命令执行后的流程
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// 终端会话
pub struct Console<R, W> {
    driver: DialogueDriver,
    graph: Rc<dyn DialogueGraph>,
    persistence: SessionPersistence<FileStorage>,
    simulator: EffectSimulator,
    transcript: Rc<RefCell<VecDeque<Event>>>,
    _transcript_sub: Subscription,
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(
        driver: DialogueDriver,
        graph: Rc<dyn DialogueGraph>,
        persistence: SessionPersistence<FileStorage>,
        effects: &EffectsConfig,
        input: R,
        output: W,
    ) -> Self {
        let simulator = EffectSimulator::attach(driver.events(), effects);
        let transcript: Rc<RefCell<VecDeque<Event>>> = Rc::default();
        let sink = transcript.clone();
        let transcript_sub = driver
            .events()
            .subscribe_all(move |event| sink.borrow_mut().push_back(event.clone()));

        Self {
            driver,
            graph,
            persistence,
            simulator,
            transcript,
            _transcript_sub: transcript_sub,
            input,
            output,
        }
    }

    pub fn driver(&self) -> &DialogueDriver {
        &self.driver
    }

    pub fn persistence(&self) -> &SessionPersistence<FileStorage> {
        &self.persistence
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    /// 从入口节点开始
    pub fn start(&mut self) -> anyhow::Result<DriverState> {
        self.driver
            .start_dialogue(self.graph.clone())
            .context("无法开始对话")?;
        self.settle()
    }

    /// 从存档槽位继续
    pub fn resume(&mut self, slot: u32) -> anyhow::Result<DriverState> {
        let loaded = self
            .persistence
            .load(&slot_key(slot))
            .with_context(|| format!("无法读取存档槽位 {}", slot))?;
        loaded
            .resume(&mut self.driver, self.graph.clone())
            .context("无法从存档继续")?;
        self.settle()
    }

    /// 交互循环，直到对话结束、玩家退出或输入结束
    pub fn run(&mut self) -> anyhow::Result<()> {
        loop {
            self.render()?;
            if !self.driver.state().is_active() {
                break;
            }

            write!(self.output, "> ")?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                debug!("输入结束");
                break;
            }

            if self.execute(ConsoleCommand::parse(&line))? == Flow::Quit {
                info!("玩家退出");
                self.driver.abort();
                self.transcript.borrow_mut().clear();
                break;
            }
        }
        Ok(())
    }

    /// 执行一条命令
    pub fn execute(&mut self, command: ConsoleCommand) -> anyhow::Result<Flow> {
        match command {
            ConsoleCommand::Continue => {
                self.driver.continue_dialogue()?;
                self.settle()?;
            }
            ConsoleCommand::Choose(index) => {
                self.driver.submit(DialogueInput::choice(index))?;
                self.settle()?;
            }
            ConsoleCommand::Skip => {
                self.driver.skip()?;
                self.settle()?;
            }
            ConsoleCommand::Save(slot) => self.save(slot)?,
            ConsoleCommand::Load(slot) => self.load(slot)?,
            ConsoleCommand::History => self.show_history()?,
            ConsoleCommand::Quit => return Ok(Flow::Quit),
            ConsoleCommand::Unknown(text) => {
                writeln!(
                    self.output,
                    "无法识别的命令: {}（回车继续，数字选择，skip/save [N]/load N/history/quit）",
                    text
                )?;
            }
        }
        Ok(Flow::Continue)
    }

    fn settle(&mut self) -> anyhow::Result<DriverState> {
        Ok(self.simulator.settle(&mut self.driver)?)
    }

    fn check_slot(&mut self, slot: u32) -> anyhow::Result<bool> {
        if (1..=MAX_SAVE_SLOTS).contains(&slot) {
            Ok(true)
        } else {
            writeln!(self.output, "槽位必须在 1 - {} 之间", MAX_SAVE_SLOTS)?;
            Ok(false)
        }
    }

    fn save(&mut self, slot: Option<u32>) -> anyhow::Result<()> {
        let slot = match slot {
            Some(slot) => slot,
            None => match self.persistence.storage().next_available_slot() {
                Some(slot) => slot,
                None => {
                    writeln!(self.output, "没有空闲的存档槽位")?;
                    return Ok(());
                }
            },
        };
        if !self.check_slot(slot)? {
            return Ok(());
        }
        let (Some(graph_id), Some(node_id)) =
            (self.driver.graph_id(), self.driver.current_node_id())
        else {
            writeln!(self.output, "当前没有进行中的对话")?;
            return Ok(());
        };

        self.persistence
            .save(&slot_key(slot), graph_id, node_id, self.driver.local())?;
        writeln!(self.output, "已保存到槽位 {}", slot)?;
        Ok(())
    }

    fn load(&mut self, slot: u32) -> anyhow::Result<()> {
        if !self.check_slot(slot)? {
            return Ok(());
        }
        let loaded = match self.persistence.load(&slot_key(slot)) {
            Ok(loaded) => loaded,
            Err(PersistenceError::NotFound { .. }) => {
                writeln!(self.output, "槽位 {} 没有可用的存档", slot)?;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        // 读档替换当前会话，中止事件不显示
        self.driver.abort();
        self.transcript.borrow_mut().clear();

        writeln!(self.output, "已读取槽位 {}", slot)?;
        loaded.resume(&mut self.driver, self.graph.clone())?;
        self.settle()?;
        Ok(())
    }

    fn show_history(&mut self) -> anyhow::Result<()> {
        let history = self.driver.history();
        if history.line_count() == 0 {
            writeln!(self.output, "（暂无台词）")?;
            return Ok(());
        }
        for event in history.recent_lines(HISTORY_LINES) {
            if let HistoryEvent::Line { speaker, text } = event {
                writeln!(self.output, "  | {}", format_line(speaker.as_deref(), text))?;
            }
        }
        Ok(())
    }

    /// 输出自上次渲染以来的事件
    fn render(&mut self) -> anyhow::Result<()> {
        let events: Vec<Event> = self.transcript.borrow_mut().drain(..).collect();
        for event in events {
            match event {
                Event::SessionStarted { graph_id, .. } => {
                    writeln!(self.output, "== {} ==", graph_id)?;
                }
                Event::ShowLine { speaker, text, .. } => {
                    writeln!(self.output, "{}", format_line(speaker.as_deref(), &text))?;
                }
                Event::PresentChoices {
                    prompt, choices, ..
                } => {
                    if let Some(prompt) = prompt {
                        writeln!(self.output, "{}", prompt)?;
                    }
                    for choice in choices {
                        writeln!(self.output, "  [{}] {}", choice.index + 1, choice.text)?;
                    }
                }
                Event::Effect { request, .. } => {
                    writeln!(self.output, "  * {}", describe_effect(&request))?;
                }
                Event::EffectCancelled { .. } => {}
                Event::SessionEnded { reason, .. } => {
                    let text = match reason {
                        EndReason::Finished => "（完）",
                        EndReason::Aborted => "（对话已中止）",
                        EndReason::Failed => "（对话因错误结束）",
                    };
                    writeln!(self.output, "{}", text)?;
                }
            }
        }
        Ok(())
    }
}

fn format_line(speaker: Option<&str>, text: &str) -> String {
    match speaker {
        Some(speaker) => format!("{}：{}", speaker, text),
        None => text.to_string(),
    }
}

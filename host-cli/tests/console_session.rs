//! # 终端会话集成测试
//!
//! 测试 Console → DialogueDriver → FileStorage 的完整链路。
//! 输入输出使用内存缓冲，存档写入临时目录。

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use dialogue_runtime::{
    DialogueDriver, DialogueGraph, DriverState, GlobalStore, PersistenceError, SaveStorage,
    SessionPersistence,
};
use host_cli::{Console, EffectsConfig, FileStorage, check_graph_file, load_graph, slot_key};

type TestConsole = Console<Cursor<Vec<u8>>, Vec<u8>>;

fn demo_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("assets/demo.json")
}

fn console(saves_dir: &Path, input: &str) -> TestConsole {
    let graph: Rc<dyn DialogueGraph> = Rc::new(load_graph(demo_path()).unwrap());
    let driver = DialogueDriver::new(Some(GlobalStore::new()));
    Console::new(
        driver,
        graph,
        SessionPersistence::new(FileStorage::new(saves_dir)),
        &EffectsConfig::default(),
        Cursor::new(input.as_bytes().to_vec()),
        Vec::new(),
    )
}

fn output(console: &TestConsole) -> String {
    String::from_utf8(console.output().clone()).unwrap()
}

/// 测试完整流程：台词、效果、选择、条件分支、全局变量
#[test]
fn test_play_through_warm_route() {
    let dir = tempfile::tempdir().unwrap();
    let mut console = console(dir.path(), "\n\n1\n\n\n");

    assert_eq!(console.start().unwrap(), DriverState::AwaitingInput);
    console.run().unwrap();

    assert_eq!(console.driver().state(), DriverState::Ended);
    let text = output(&console);
    assert!(text.contains("== demo =="));
    assert!(text.contains("雨还在下。"));
    assert!(text.contains("* 播放音频 rain.ogg [Bgm]（循环）"));
    assert!(text.contains("Alice：你也在等雨停吗？"));
    assert!(text.contains("  [1] 是啊，一起等吧。"));
    assert!(text.contains("  [2] ……"));
    // met_before 未设置，第三个选项不可见
    assert!(!text.contains("[3]"));
    assert!(text.contains("两个人一起走了出去"));
    assert!(text.trim_end().ends_with("（完）"));

    let global = console.driver().global().unwrap().snapshot();
    assert!(global.get::<bool>("met_before"));
    // 正常结束后局部变量被清空
    assert!(console.driver().local().is_empty());
}

/// 测试冷淡路线走到普通结局
#[test]
fn test_play_through_cold_route() {
    let dir = tempfile::tempdir().unwrap();
    let mut console = console(dir.path(), "\n\n2\n\n\n");

    console.start().unwrap();
    console.run().unwrap();

    let text = output(&console);
    assert!(text.contains("Alice：……好吧。"));
    assert!(text.contains("雨停了。"));
    assert!(!text.contains("两个人一起走了出去"));
    assert!(
        !console
            .driver()
            .global()
            .unwrap()
            .snapshot()
            .get::<bool>("met_before")
    );
}

/// 测试存档后在新会话中继续
#[test]
fn test_save_then_resume_in_new_session() {
    let dir = tempfile::tempdir().unwrap();

    let mut first = console(dir.path(), "\n\n1\nsave 2\nquit\n");
    first.start().unwrap();
    first.run().unwrap();

    assert!(output(&first).contains("已保存到槽位 2"));
    assert_eq!(first.driver().state(), DriverState::Ended);
    assert!(dir.path().join("slot_002.json").exists());

    let mut second = console(dir.path(), "\n\n");
    assert_eq!(second.resume(2).unwrap(), DriverState::AwaitingInput);
    assert_eq!(second.driver().current_node_id(), Some("warm_line"));
    assert_eq!(second.driver().local().get::<i64>("favor"), 1);

    second.run().unwrap();
    let text = output(&second);
    assert!(text.contains("Alice：那就一起吧。"));
    assert!(text.contains("两个人一起走了出去"));
}

/// 测试会话中读档替换当前进度
#[test]
fn test_load_replaces_running_session() {
    let dir = tempfile::tempdir().unwrap();

    let mut first = console(dir.path(), "\n\nsave 1\n2\nload 1\n");
    first.start().unwrap();
    first.run().unwrap();

    let text = output(&first);
    assert!(text.contains("已读取槽位 1"));
    assert!(!text.contains("（对话已中止）"));
    assert_eq!(first.driver().current_node_id(), Some("ask"));
    assert_eq!(first.driver().state(), DriverState::AwaitingInput);
}

/// 测试读取不存在或损坏的槽位
#[test]
fn test_load_unusable_slot() {
    let dir = tempfile::tempdir().unwrap();
    let mut storage = FileStorage::new(dir.path());
    storage.write_string(&slot_key(4), "{ 损坏的存档").unwrap();

    let mut console = console(dir.path(), "load 3\nload 4\nload 0\n");
    console.start().unwrap();
    console.run().unwrap();

    let text = output(&console);
    assert!(text.contains("槽位 3 没有可用的存档"));
    assert!(text.contains("槽位 4 没有可用的存档"));
    assert!(text.contains("槽位必须在 1 - 99 之间"));
    assert_eq!(console.driver().current_node_id(), Some("intro"));

    assert!(console.resume(3).is_err());
}

/// 测试非 UTF-8 的存档文件按不存在处理，会话继续
#[test]
fn test_load_non_utf8_slot() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("slot_001.json"), [0xff, 0xfe, 0x00, 0x7b]).unwrap();

    let persistence = SessionPersistence::new(FileStorage::new(dir.path()));
    assert!(matches!(
        persistence.load(&slot_key(1)),
        Err(PersistenceError::NotFound { .. })
    ));

    let mut console = console(dir.path(), "load 1\n\n");
    console.start().unwrap();
    console.run().unwrap();

    assert!(output(&console).contains("槽位 1 没有可用的存档"));
    assert_eq!(console.driver().current_node_id(), Some("greeting"));
    assert_eq!(console.driver().state(), DriverState::AwaitingInput);
}

/// 测试不带槽位的存档使用第一个空槽位
#[test]
fn test_save_without_slot_uses_next_free() {
    let dir = tempfile::tempdir().unwrap();
    let mut storage = FileStorage::new(dir.path());
    storage.write_string(&slot_key(1), "{}").unwrap();

    let mut console = console(dir.path(), "save\nsave\n");
    console.start().unwrap();
    console.run().unwrap();

    let text = output(&console);
    assert!(text.contains("已保存到槽位 2"));
    assert!(text.contains("已保存到槽位 3"));
    assert_eq!(storage.list_slots(), vec![1, 2, 3]);
}

/// 测试无效输入不推进对话
#[test]
fn test_invalid_input_keeps_position() {
    let dir = tempfile::tempdir().unwrap();
    let mut console = console(dir.path(), "\n\n7\ndance\n");

    console.start().unwrap();
    console.run().unwrap();

    assert_eq!(console.driver().current_node_id(), Some("ask"));
    assert_eq!(console.driver().state(), DriverState::AwaitingInput);
    assert!(output(&console).contains("无法识别的命令: dance"));
}

/// 测试回看
#[test]
fn test_history_command() {
    let dir = tempfile::tempdir().unwrap();
    let mut console = console(dir.path(), "history\n\nhistory\n");

    console.start().unwrap();
    console.run().unwrap();

    let text = output(&console);
    assert!(text.contains("  | 雨还在下。"));
    assert!(text.contains("  | Alice：你也在等雨停吗？"));
}

/// 测试 demo 图通过静态检查
#[test]
fn test_demo_graph_is_clean() {
    let result = check_graph_file(demo_path()).unwrap();
    assert!(result.is_empty(), "{:?}", result.diagnostics);
}

/// 测试有问题的图被检查出来
#[test]
fn test_broken_graph_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(
        &path,
        r#"{ "id": "broken", "entry": "A", "nodes": [
            { "id": "A", "type": "line", "text": "你好", "next": "nowhere" },
            { "id": "B", "type": "choice", "options": [] }
        ]}"#,
    )
    .unwrap();

    let result = check_graph_file(&path).unwrap();
    assert_eq!(result.error_count(), 2);
    assert_eq!(result.warn_count(), 1);
    assert!(load_graph(&path).is_ok());

    std::fs::write(&path, "not json").unwrap();
    assert!(check_graph_file(&path).is_err());
}

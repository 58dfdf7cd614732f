use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use hive_core::lifecycle::TaskAction;

/// Keys handled while the repository list has focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListCommand {
    SelectNext,
    SelectPrevious,
    Open,
    AddRepository,
    RemoveRepository,
    TogglePin,
    Initialize,
    Refresh,
    Quit,
}

/// Keys handled by a repository instance in normal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceCommand {
    SelectNext,
    SelectPrevious,
    NewTask,
    Action(TaskAction),
    ToggleBlock,
    TransitionMenu,
    Prompt,
    /// Zero-based index into the active permission request's options.
    AnswerPermission(usize),
    /// Scrollable chooser over every option of the active request.
    PermissionPicker,
    Cancel,
    PageLog,
    ShowDiff,
    EditConfig,
    FocusList,
    Quit,
}

pub fn is_press(key: &KeyEvent) -> bool {
    key.kind == KeyEventKind::Press
}

pub fn is_interrupt(key: &KeyEvent) -> bool {
    key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c')
}

pub fn map_list_key(key: KeyEvent) -> Option<ListCommand> {
    if !is_press(&key) {
        return None;
    }
    if is_interrupt(&key) {
        return Some(ListCommand::Quit);
    }

    match key.code {
        KeyCode::Char('j') | KeyCode::Down => Some(ListCommand::SelectNext),
        KeyCode::Char('k') | KeyCode::Up => Some(ListCommand::SelectPrevious),
        KeyCode::Enter | KeyCode::Char('l') | KeyCode::Right => Some(ListCommand::Open),
        KeyCode::Char('a') => Some(ListCommand::AddRepository),
        KeyCode::Char('d') => Some(ListCommand::RemoveRepository),
        KeyCode::Char('p') => Some(ListCommand::TogglePin),
        KeyCode::Char('i') => Some(ListCommand::Initialize),
        KeyCode::Char('r') => Some(ListCommand::Refresh),
        KeyCode::Char('q') => Some(ListCommand::Quit),
        _ => None,
    }
}

pub fn map_instance_key(key: KeyEvent) -> Option<InstanceCommand> {
    if !is_press(&key) {
        return None;
    }
    if is_interrupt(&key) {
        return Some(InstanceCommand::Quit);
    }

    match key.code {
        KeyCode::Char('j') | KeyCode::Down => Some(InstanceCommand::SelectNext),
        KeyCode::Char('k') | KeyCode::Up => Some(InstanceCommand::SelectPrevious),
        KeyCode::Esc => Some(InstanceCommand::FocusList),
        KeyCode::Enter | KeyCode::Char('a') => Some(InstanceCommand::Action(TaskAction::Attach)),
        KeyCode::Char('n') => Some(InstanceCommand::NewTask),
        KeyCode::Char('s') => Some(InstanceCommand::Action(TaskAction::Start)),
        KeyCode::Char('x') => Some(InstanceCommand::Action(TaskAction::Stop)),
        KeyCode::Char('R') => Some(InstanceCommand::Action(TaskAction::SubmitForReview)),
        KeyCode::Char('v') => Some(InstanceCommand::Action(TaskAction::Review)),
        KeyCode::Char('V') => Some(InstanceCommand::Action(TaskAction::FinishReview)),
        KeyCode::Char('A') => Some(InstanceCommand::Action(TaskAction::Approve)),
        KeyCode::Char('m') => Some(InstanceCommand::Action(TaskAction::Merge)),
        KeyCode::Char('c') => Some(InstanceCommand::Action(TaskAction::Close)),
        KeyCode::Char('b') => Some(InstanceCommand::ToggleBlock),
        KeyCode::Char('t') => Some(InstanceCommand::TransitionMenu),
        KeyCode::Char('p') => Some(InstanceCommand::Prompt),
        KeyCode::Char('P') => Some(InstanceCommand::PermissionPicker),
        KeyCode::Char('C') => Some(InstanceCommand::Cancel),
        KeyCode::Char('L') => Some(InstanceCommand::PageLog),
        KeyCode::Char('g') => Some(InstanceCommand::ShowDiff),
        KeyCode::Char('e') => Some(InstanceCommand::EditConfig),
        KeyCode::Char('q') => Some(InstanceCommand::Quit),
        KeyCode::Char(digit @ '1'..='9') => Some(InstanceCommand::AnswerPermission(
            digit as usize - '1' as usize,
        )),
        _ => None,
    }
}

/// Footer hints for the list pane.
pub const LIST_HINTS: &[(&str, &str)] = &[
    ("j/k", "move"),
    ("enter", "open"),
    ("a", "add"),
    ("d", "remove"),
    ("p", "pin"),
    ("i", "init"),
    ("r", "refresh"),
    ("q", "quit"),
];

/// Footer hints for a focused instance.
pub const INSTANCE_HINTS: &[(&str, &str)] = &[
    ("n", "new"),
    ("s", "start"),
    ("x", "stop"),
    ("enter", "attach"),
    ("p", "prompt"),
    ("1-9", "answer"),
    ("P", "options"),
    ("t", "transition"),
    ("L", "log"),
    ("g", "diff"),
    ("tab", "repos"),
];

/// All semantic actions on the board view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    // Navigation
    FocusPrevStatus,
    FocusNextStatus,
    FocusPrevMember,
    FocusNextMember,
    SelectPrevTask,
    SelectNextTask,

    // Moving a task
    PickUp,
    Drop,
    CancelMove,

    // Task actions
    NewTask,
    DeleteTask,
    CyclePriority,
    OpenTaskDetail,
    ClosePanel,
    DetailScrollUp,
    DetailScrollDown,

    // Board
    ReloadBoard,
    ShowHelp,
    Quit,

    // Input modal
    InputConfirm,
    InputCancel,
    InputChar(char),
    InputBackspace,
    InputLeft,
    InputRight,
    InputHome,
    InputEnd,
    InputDeleteWord,

    // Confirmation
    Confirm,
    Deny,

    None,
}

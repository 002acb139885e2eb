mod api;
mod app;
mod board;
mod config;
mod input;
mod logging;
mod storage;
mod ui;

use std::fmt::Write as _;
use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{bail, eyre, WrapErr};

use api::types::{LoginPayload, ProjectPayload, SignupPayload};
use api::{ApiClient, ApiError, ProjectTasks};
use board::persist::{persist, Applied, BoardSession, PersistError, Settlement};
use board::resolve::MoveDescriptor;
use board::{Board, BoardError, CellKey, Priority, TaskPayload};
use config::ClientConfig;
use storage::{Session, StorageError};

#[derive(Parser)]
#[command(name = "taskmatrix", about = "A keyboard-first client for task-matrix project boards")]
struct Cli {
    /// Service URL (overrides `server_url` in config.toml)
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and remember the session
    Login {
        username: String,
        /// Read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Create an account and log in
    Signup {
        username: String,
        #[arg(long)]
        email: String,
        /// Display name (defaults to the username)
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = "")]
        avatar_url: String,
        /// Read from stdin (twice) when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// Show the logged-in user
    Whoami,
    /// List your projects
    Projects,
    /// Manage projects
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },
    /// Manage project members
    Member {
        #[command(subcommand)]
        action: MemberAction,
    },
    /// Manage tasks
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },
    /// Move a task to another cell, or to another position in its cell
    Move {
        project: i64,
        task: i64,
        /// Destination cell as <assignee>--<status>
        #[arg(long)]
        to: CellKey,
        /// Position in the destination cell (default: last)
        #[arg(long)]
        index: Option<usize>,
    },
    /// Open a project's board
    Board { project: i64 },
}

#[derive(Subcommand)]
enum ProjectAction {
    /// Create a project
    Create {
        name: String,
        /// Due date as YYYY-MM-DD
        #[arg(long)]
        due: String,
        #[arg(short, long, default_value = "")]
        description: String,
        #[arg(long, default_value_t = 1)]
        status: i64,
    },
    /// Change a project; omitted fields keep their value
    Update {
        project: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        due: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(long)]
        status: Option<i64>,
    },
    /// Delete a project
    Delete { project: i64 },
    /// Print a project's board, grouped by cell
    Show { project: i64 },
}

#[derive(Subcommand)]
enum MemberAction {
    /// Add a user to a project by username
    Add { project: i64, username: String },
    /// Remove a user from a project
    Remove { project: i64, user_id: i64 },
}

#[derive(Subcommand)]
enum TaskAction {
    /// Create a task in a cell
    Add {
        project: i64,
        title: String,
        /// Cell as <assignee>--<status>
        #[arg(long)]
        to: CellKey,
        #[arg(short, long, default_value = "")]
        description: String,
        /// Priority (low, medium, high)
        #[arg(short, long, default_value = "medium")]
        priority: Priority,
    },
    /// Change a task's title, description or priority
    Edit {
        project: i64,
        task: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(short, long)]
        priority: Option<Priority>,
    },
    /// Delete a task
    Delete { project: i64, task: i64 },
}

/// Everything a command needs: where state lives and how to reach the service.
struct Context {
    dir: PathBuf,
    config: ClientConfig,
    session: Option<Session>,
    client: ApiClient,
}

impl Context {
    fn load(server: Option<String>) -> color_eyre::Result<Self> {
        let dir = storage::config_dir()?;
        let config = storage::load_config(&dir)?;
        // Logging is best effort.
        if let Err(e) = logging::init(&dir, &config.log_level) {
            eprintln!("warning: logging disabled: {e}");
        }
        let session = storage::load_session(&dir)?;

        let server_url = server.unwrap_or_else(|| config.server_url.clone());
        let mut client = ApiClient::new(&server_url, config.request_timeout())?;
        if let Some(session) = &session {
            client = client.with_token(session.token.clone());
        }
        tracing::debug!(server = client.base_url(), logged_in = session.is_some(), "client ready");
        Ok(Self { dir, config, session, client })
    }

    async fn board(&self, project_id: i64) -> Result<Board, ApiError> {
        let detail = self.client.get_project(project_id).await?;
        Ok(detail.into_board(self.config.statuses.clone()))
    }
}

fn main() {
    // Install color_eyre for unexpected panics/errors (developer bugs).
    let _ = color_eyre::install();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        print_user_error(&e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> color_eyre::Result<()> {
    let ctx = Context::load(cli.server)?;
    let runtime = tokio::runtime::Runtime::new().wrap_err("failed to start the async runtime")?;

    match cli.command {
        Command::Login { username, password } => runtime.block_on(cmd_login(&ctx, username, password)),
        Command::Signup { username, email, name, avatar_url, password } => {
            runtime.block_on(cmd_signup(&ctx, username, email, name, avatar_url, password))
        }
        Command::Logout => cmd_logout(&ctx),
        Command::Whoami => runtime.block_on(cmd_whoami(&ctx)),
        Command::Projects => runtime.block_on(cmd_projects(&ctx)),
        Command::Project { action } => runtime.block_on(cmd_project(&ctx, action)),
        Command::Member { action } => runtime.block_on(cmd_member(&ctx, action)),
        Command::Task { action } => runtime.block_on(cmd_task(&ctx, action)),
        Command::Move { project, task, to, index } => runtime.block_on(cmd_move(&ctx, project, task, to, index)),
        // The board view blocks on the runtime itself.
        Command::Board { project } => cmd_board(&ctx, &runtime, project),
    }
}

/// Print a user-friendly error message, with actionable hints for known error types.
fn print_user_error(error: &color_eyre::Report) {
    if let Some(api_err) = error.downcast_ref::<ApiError>() {
        match api_err {
            ApiError::NotLoggedIn => {
                eprintln!("error: not logged in.");
                eprintln!("  Run `taskmatrix login <username>` first.");
            }
            ApiError::Status { status: 401, message } => {
                eprintln!("error: the server did not accept your session: {message}");
                eprintln!("  Run `taskmatrix login <username>` again.");
            }
            ApiError::Status { status, message } => {
                eprintln!("error: the server returned {status}.");
                if !message.is_empty() {
                    eprintln!("  {message}");
                }
            }
            ApiError::Invalid(reason) => eprintln!("error: {reason}"),
            ApiError::Http(e) => {
                eprintln!("error: could not reach the server.");
                eprintln!("  {e}");
                eprintln!("  Check `server_url` in config.toml or pass --server.");
            }
        }
        return;
    }

    if let Some(storage_err) = error.downcast_ref::<StorageError>() {
        match storage_err {
            StorageError::TomlDe { path, source } => {
                eprintln!("error: {} has invalid TOML.", path.display());
                eprintln!("  {source}");
            }
            StorageError::NoConfigDir => {
                eprintln!("error: could not find a config directory.");
                eprintln!("  Set {} to a writable directory.", storage::HOME_ENV);
            }
            StorageError::TomlSer(e) => {
                eprintln!("error: failed to save settings.");
                eprintln!("  {e}");
            }
            StorageError::Io(e) => {
                eprintln!("error: could not read or write client files.");
                eprintln!("  {e}");
            }
        }
        return;
    }

    if let Some(board_err) = error.downcast_ref::<BoardError>() {
        eprintln!("error: {board_err}");
        if matches!(board_err, BoardError::Consistency { .. }) {
            eprintln!("  The board changed underneath you; fetch it again with `taskmatrix project show`.");
        }
        return;
    }

    if let Some(persist_err) = error.downcast_ref::<PersistError>() {
        eprintln!("error: {persist_err}");
        return;
    }

    // For eyre!() / bail!() messages, print the full error chain.
    eprintln!("error: {e:#}", e = error);
}

/// Read one line from stdin after printing `label`.
fn prompt(label: &str) -> color_eyre::Result<String> {
    print!("{label}: ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(answer.trim_end_matches(['\r', '\n']).to_string())
}

fn remember(ctx: &Context, session: Session) -> color_eyre::Result<()> {
    storage::save_session(&ctx.dir, &session)?;
    tracing::info!(user = %session.user.username, "session saved");
    println!("Logged in as {} ({})", session.user.username, session.user.name);
    Ok(())
}

async fn cmd_login(ctx: &Context, username: String, password: Option<String>) -> color_eyre::Result<()> {
    let password = match password {
        Some(p) => p,
        None => prompt("Password")?,
    };
    let auth = ctx.client.login(&LoginPayload { username, password }).await?;
    remember(ctx, Session { token: auth.token, user: auth.user })
}

async fn cmd_signup(
    ctx: &Context,
    username: String,
    email: String,
    name: Option<String>,
    avatar_url: String,
    password: Option<String>,
) -> color_eyre::Result<()> {
    let (password, confirm_password) = match password {
        Some(p) => (p.clone(), p),
        None => (prompt("Password")?, prompt("Confirm password")?),
    };
    let payload = SignupPayload {
        avatar_url,
        name: name.unwrap_or_else(|| username.clone()),
        username,
        email,
        password,
        confirm_password,
    };
    let auth = ctx.client.signup(&payload).await?;
    remember(ctx, Session { token: auth.token, user: auth.user })
}

fn cmd_logout(ctx: &Context) -> color_eyre::Result<()> {
    if storage::clear_session(&ctx.dir)? {
        println!("Logged out.");
    } else {
        println!("No session to forget.");
    }
    Ok(())
}

async fn cmd_whoami(ctx: &Context) -> color_eyre::Result<()> {
    if ctx.session.is_none() {
        return Err(ApiError::NotLoggedIn.into());
    }
    let user = ctx.client.validate().await?;
    println!("{} ({}), id {}", user.username, user.name, user.id);
    Ok(())
}

async fn cmd_projects(ctx: &Context) -> color_eyre::Result<()> {
    let projects = ctx.client.list_projects().await?;
    if projects.is_empty() {
        println!("No projects yet. Create one with `taskmatrix project create`.");
        return Ok(());
    }
    println!("\n{:>5}  {:<30} {:<12} {:<12} done", "id", "name", "due", "status");
    println!("{}", "─".repeat(70));
    for p in &projects {
        let status = p.status.as_ref().map_or("", |s| s.name.as_str());
        println!(
            "{:>5}  {:<30} {:<12} {:<12} {}/{}",
            p.id,
            ui::board_view::truncate(&p.name, 30),
            due_date(&p.due_date),
            status,
            p.tasks_completed,
            p.total_tasks
        );
    }
    println!();
    Ok(())
}

/// The date part of a service timestamp.
fn due_date(raw: &str) -> &str {
    raw.get(..10).unwrap_or(raw)
}

async fn cmd_project(ctx: &Context, action: ProjectAction) -> color_eyre::Result<()> {
    match action {
        ProjectAction::Create { name, due, description, status } => {
            let payload = ProjectPayload { name, description, due_date: due, status_id: status };
            let project = ctx.client.create_project(&payload).await?;
            println!("Created project {}: {}", project.id, project.name);
        }
        ProjectAction::Update { project, name, due, description, status } => {
            let current = ctx.client.get_project(project).await?;
            let payload = ProjectPayload {
                name: name.unwrap_or(current.name),
                description: description.unwrap_or(current.description),
                due_date: due.unwrap_or_else(|| due_date(&current.due_date).to_string()),
                status_id: status.or(current.status.map(|s| s.id)).unwrap_or(1),
            };
            let updated = ctx.client.update_project(project, &payload).await?;
            println!("Updated project {}: {}", updated.id, updated.name);
        }
        ProjectAction::Delete { project } => {
            ctx.client.delete_project(project).await?;
            println!("Deleted project {project}");
        }
        ProjectAction::Show { project } => {
            let board = ctx.board(project).await?;
            print!("{}", format_board(&board));
        }
    }
    Ok(())
}

/// Text rendering of a board for `project show`: one block per non-empty
/// cell, then anything outside the grid.
fn format_board(board: &Board) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n{} (project {})", board.name, board.project_id);
    if !board.description.is_empty() {
        let _ = writeln!(out, "{}", board.description);
    }

    let index = board.index();
    let mut shown = 0;
    for (cell, tasks) in index.iter() {
        if tasks.is_empty() {
            continue;
        }
        shown += 1;
        let _ = writeln!(out, "\n{} [{cell}] ({})", board.cell_label(cell), tasks.len());
        let _ = writeln!(out, "{}", "─".repeat(40));
        for task in tasks {
            let priority = task.priority().map_or("-", |p| p.as_str());
            let _ = writeln!(out, "  {:>5}  {:<7} {}", task.id, priority, task.title);
        }
    }
    if shown == 0 {
        let _ = writeln!(out, "\nNo tasks on the board.");
    }

    let unplaced = index.unplaced();
    if !unplaced.is_empty() {
        let _ = writeln!(out, "\nOutside the board ({})", unplaced.len());
        let _ = writeln!(out, "{}", "─".repeat(40));
        for task in unplaced {
            let _ = writeln!(out, "  {:>5}  [{}] {}", task.id, task.cell(), task.title);
        }
    }
    out.push('\n');
    out
}

async fn cmd_member(ctx: &Context, action: MemberAction) -> color_eyre::Result<()> {
    match action {
        MemberAction::Add { project, username } => {
            let user = ctx.client.add_member(project, &username).await?;
            println!("Added {} (id {}) to project {project}", user.username, user.id);
        }
        MemberAction::Remove { project, user_id } => {
            ctx.client.remove_member(project, user_id).await?;
            println!("Removed user {user_id} from project {project}");
        }
    }
    Ok(())
}

/// Reject cells that are not part of the project's grid.
fn ensure_on_board(board: &Board, cell: CellKey) -> color_eyre::Result<()> {
    if board.member_name(cell.assignee_id).is_none() {
        bail!("user {} is not a member of project {}", cell.assignee_id, board.project_id);
    }
    if board.status_name(cell.status_id).is_none() {
        bail!("status {} is not configured; see [[statuses]] in config.toml", cell.status_id);
    }
    Ok(())
}

async fn cmd_task(ctx: &Context, action: TaskAction) -> color_eyre::Result<()> {
    match action {
        TaskAction::Add { project, title, to, description, priority } => {
            let board = ctx.board(project).await?;
            ensure_on_board(&board, to)?;
            let payload = TaskPayload {
                title,
                description,
                priority_id: priority.id(),
                status_id: to.status_id,
                assignee_id: to.assignee_id,
            };
            let task = ctx.client.create_task(project, &payload).await?;
            println!("Created task {} in {}", task.id, board.cell_label(to));
        }
        TaskAction::Edit { project, task, title, description, priority } => {
            let board = ctx.board(project).await?;
            let mut current = board
                .task(task)
                .cloned()
                .ok_or_else(|| eyre!("task {task} not found in project {project}"))?;
            if let Some(title) = title {
                current.title = title;
            }
            if let Some(description) = description {
                current.description = description;
            }
            if let Some(priority) = priority {
                current.priority_id = priority.id();
            }
            ctx.client.update_task(project, task, &TaskPayload::from(&current)).await?;
            println!("Updated task {task}");
        }
        TaskAction::Delete { project, task } => {
            ctx.client.delete_task(project, task).await?;
            println!("Deleted task {task}");
        }
    }
    Ok(())
}

async fn cmd_move(
    ctx: &Context,
    project: i64,
    task_id: i64,
    to: CellKey,
    index: Option<usize>,
) -> color_eyre::Result<()> {
    let board = ctx.board(project).await?;
    ensure_on_board(&board, to)?;
    let task = board
        .task(task_id)
        .ok_or_else(|| eyre!("task {task_id} not found in project {project}"))?;
    let source = task.cell();
    let source_index = board
        .tasks
        .iter()
        .filter(|t| t.cell() == source)
        .position(|t| t.id == task_id)
        .unwrap_or_default();

    let mut session = BoardSession::new(board, ctx.config.on_persist_failure);
    // Indices past the end are clamped to the cell's length.
    let mv = MoveDescriptor::new(task_id, source, source_index).to(to, index.unwrap_or(usize::MAX));
    let request = match session.apply_move(&mv)? {
        Applied::Unchanged => {
            println!("Nothing to move.");
            return Ok(());
        }
        Applied::Reordered => {
            println!("Task {task_id} reordered within {}. Order is not stored by the service.", session.board().cell_label(to));
            return Ok(());
        }
        Applied::Reclassified(request) => request,
    };

    let store = ProjectTasks::new(ctx.client.clone(), project);
    let report = persist(&store, request).await;
    let label = session.board().cell_label(to);
    match session.settle(report) {
        Settlement::Confirmed => {
            println!("Moved task {task_id} to {label}");
            Ok(())
        }
        Settlement::Kept(e)
        | Settlement::Restored(e)
        | Settlement::Reverted(e)
        | Settlement::Superseded(e) => Err(e.into()),
        Settlement::Stale => bail!("board changed while saving task {task_id}"),
    }
}

fn cmd_board(ctx: &Context, runtime: &tokio::runtime::Runtime, project: i64) -> color_eyre::Result<()> {
    if ctx.session.is_none() {
        return Err(ApiError::NotLoggedIn.into());
    }
    let (remote, reports) = app::Remote::new(
        ctx.client.clone(),
        project,
        ctx.config.statuses.clone(),
        runtime.handle().clone(),
    );
    let board = remote.fetch_board()?;
    tracing::info!(project, tasks = board.tasks.len(), "opening board");
    let app = app::App::new(board, ctx.config.on_persist_failure, remote, reports);

    let mut terminal = ratatui::init();
    let result = app::run(&mut terminal, app);
    ratatui::restore();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::test_support::{board, task};

    #[test]
    fn parses_move_with_cell_key() {
        let cli = Cli::try_parse_from(["taskmatrix", "move", "3", "17", "--to", "5--2", "--index", "1"]).unwrap();
        match cli.command {
            Command::Move { project, task, to, index } => {
                assert_eq!((project, task), (3, 17));
                assert_eq!(to, CellKey::new(5, 2));
                assert_eq!(index, Some(1));
            }
            _ => panic!("expected move"),
        }
    }

    #[test]
    fn rejects_malformed_cell_key() {
        assert!(Cli::try_parse_from(["taskmatrix", "move", "3", "17", "--to", "5-2"]).is_err());
        assert!(Cli::try_parse_from(["taskmatrix", "task", "add", "3", "x", "--to", "a--b"]).is_err());
    }

    #[test]
    fn parses_task_add_priority() {
        let cli = Cli::try_parse_from(["taskmatrix", "task", "add", "3", "Write docs", "--to", "1--2", "-p", "high"])
            .unwrap();
        match cli.command {
            Command::Task { action: TaskAction::Add { title, priority, .. } } => {
                assert_eq!(title, "Write docs");
                assert_eq!(priority, Priority::High);
            }
            _ => panic!("expected task add"),
        }
    }

    #[test]
    fn server_flag_is_global() {
        let cli = Cli::try_parse_from(["taskmatrix", "projects", "--server", "http://example.test"]).unwrap();
        assert_eq!(cli.server.as_deref(), Some("http://example.test"));
    }

    #[test]
    fn due_date_strips_time() {
        assert_eq!(due_date("2025-06-30T00:00:00Z"), "2025-06-30");
        assert_eq!(due_date("2025"), "2025");
    }

    #[test]
    fn format_board_groups_by_cell() {
        let b = board(
            &[1, 2],
            &[1, 2],
            vec![task(1, (1, 1)), task(2, (2, 2)), task(3, (1, 1)), task(4, (9, 1))],
        );
        let out = format_board(&b);
        let first = out.find("member 1 / status 1 [1--1] (2)").unwrap();
        let second = out.find("member 2 / status 2 [2--2] (1)").unwrap();
        assert!(first < second);
        assert!(out.find("task 1").unwrap() < out.find("task 3").unwrap());
        assert!(out.contains("Outside the board (1)"));
        assert!(out.contains("[9--1] task 4"));
        assert!(!out.contains("member 1 / status 2"));
    }

    #[test]
    fn ensure_on_board_checks_member_and_status() {
        let b = board(&[1], &[1], vec![]);
        assert!(ensure_on_board(&b, CellKey::new(1, 1)).is_ok());
        assert!(ensure_on_board(&b, CellKey::new(2, 1)).unwrap_err().to_string().contains("not a member"));
        assert!(ensure_on_board(&b, CellKey::new(1, 9)).unwrap_err().to_string().contains("not configured"));
    }
}

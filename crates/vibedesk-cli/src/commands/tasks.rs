use vibedesk_core::dashboard::Dashboard;
use vibedesk_core::mirror::{LibSqlMirror, SyncWriter};
use vibedesk_core::models::{CollectionRecord, Task};
use vibedesk_core::NoticeBoard;

use crate::commands::common::{
    format_task_lines, join_words, load_records, resolve_record, task_to_list_item, Context,
    TaskListItem,
};
use crate::error::CliError;

async fn open_dashboard(ctx: &Context) -> Result<Dashboard<LibSqlMirror>, CliError> {
    let mirror = ctx.open_mirror().await?;
    Ok(Dashboard::new(
        ctx.scope.clone(),
        SyncWriter::new(mirror, NoticeBoard::new()),
    ))
}

pub async fn run_tasks_add(ctx: &Context, title_parts: &[String]) -> Result<(), CliError> {
    let title = join_words(title_parts, "Task title")?;
    let dashboard = open_dashboard(ctx).await?;

    let id = dashboard
        .add_task(&title)
        .await?
        .ok_or(CliError::WriteFailed("task"))?;
    println!("{id}");
    Ok(())
}

pub async fn run_tasks_list(ctx: &Context, as_json: bool) -> Result<(), CliError> {
    let dashboard = open_dashboard(ctx).await?;
    let tasks = load_records::<Task>(dashboard.writer().mirror(), &ctx.scope).await?;

    if as_json {
        let items = tasks
            .iter()
            .map(task_to_list_item)
            .collect::<Vec<TaskListItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if tasks.is_empty() {
        println!("No tasks.");
        return Ok(());
    }
    for line in format_task_lines(&tasks) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_tasks_toggle(ctx: &Context, id: &str) -> Result<(), CliError> {
    let dashboard = open_dashboard(ctx).await?;
    let tasks = load_records::<Task>(dashboard.writer().mirror(), &ctx.scope).await?;
    let task = resolve_record(&tasks, id, Task::COLLECTION)?;

    if !dashboard.toggle_task(task).await {
        return Err(CliError::WriteFailed("task"));
    }
    let state = if task.data.completed { "open" } else { "done" };
    println!("Marked '{}' {state}", task.data.title);
    Ok(())
}

pub async fn run_tasks_delete(ctx: &Context, id: &str) -> Result<(), CliError> {
    let dashboard = open_dashboard(ctx).await?;
    let tasks = load_records::<Task>(dashboard.writer().mirror(), &ctx.scope).await?;
    let task = resolve_record(&tasks, id, Task::COLLECTION)?;

    if !dashboard.delete_task(&task.id).await {
        return Err(CliError::WriteFailed("task"));
    }
    println!("Deleted task {}", task.id);
    Ok(())
}

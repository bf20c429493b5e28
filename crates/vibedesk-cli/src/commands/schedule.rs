use vibedesk_core::dashboard::day_string;
use vibedesk_core::mirror::RemoteMirror;
use vibedesk_core::models::{CollectionRecord, ScheduleEvent};

use crate::commands::common::{
    event_to_list_item, format_event_lines, join_words, load_records, resolve_record, Context,
    EventListItem,
};
use crate::error::CliError;

pub async fn run_schedule_add(
    ctx: &Context,
    date: Option<&str>,
    time: &str,
    title_parts: &[String],
) -> Result<(), CliError> {
    let title = join_words(title_parts, "Event title")?;
    let date = date.map_or_else(
        || day_string(chrono::Local::now().date_naive()),
        ToString::to_string,
    );
    let event = ScheduleEvent::new(&date, time, title)?;

    let mirror = ctx.open_mirror().await?;
    let id = mirror
        .add(
            &ctx.scope,
            ScheduleEvent::COLLECTION,
            serde_json::to_value(&event)?,
        )
        .await?;
    println!("{id}");
    Ok(())
}

pub async fn run_schedule_list(ctx: &Context, as_json: bool) -> Result<(), CliError> {
    let mirror = ctx.open_mirror().await?;
    let events = load_records::<ScheduleEvent>(&mirror, &ctx.scope).await?;

    if as_json {
        let items = events
            .iter()
            .map(event_to_list_item)
            .collect::<Vec<EventListItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if events.is_empty() {
        println!("No scheduled events.");
        return Ok(());
    }
    for line in format_event_lines(&events) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_schedule_delete(ctx: &Context, id: &str) -> Result<(), CliError> {
    let mirror = ctx.open_mirror().await?;
    let events = load_records::<ScheduleEvent>(&mirror, &ctx.scope).await?;
    let event = resolve_record(&events, id, ScheduleEvent::COLLECTION)?;

    mirror
        .delete(&ScheduleEvent::path(&ctx.scope, &event.id))
        .await?;
    println!("Deleted event {}", event.id);
    Ok(())
}

// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use console::{Color, Style};
use tracing::{Level, Subscriber};
use tracing_subscriber::{
    fmt::{
        FmtContext, FormatEvent, FormatFields,
        format::{DefaultFields, Writer},
        time::{FormatTime, SystemTime},
    },
    registry::LookupSpan,
};

/// An event formatter for [`tracing_subscriber`], which appends the trace ID
/// of the current request to the log lines emitted while handling it.
#[derive(Debug, Default)]
pub struct EventFormatter;

const TRACE_STYLE: Style = Style::new().fg(Color::Magenta);
const DEBUG_STYLE: Style = Style::new().fg(Color::Blue);
const INFO_STYLE: Style = Style::new().fg(Color::Green);
const WARN_STYLE: Style = Style::new().fg(Color::Yellow);
const ERROR_STYLE: Style = Style::new().fg(Color::Red);

fn level_label(level: Level) -> (&'static str, Style) {
    match level {
        Level::TRACE => ("TRACE", TRACE_STYLE),
        Level::DEBUG => ("DEBUG", DEBUG_STYLE),
        Level::INFO => (" INFO", INFO_STYLE),
        Level::WARN => (" WARN", WARN_STYLE),
        Level::ERROR => ("ERROR", ERROR_STYLE),
    }
}

impl<S, N> FormatEvent<S, N> for EventFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let ansi = writer.has_ansi_escapes();
        let metadata = event.metadata();

        SystemTime.format_time(&mut writer)?;

        let (label, style) = level_label(*metadata.level());
        write!(&mut writer, " {} ", style.force_styling(ansi).apply_to(label))?;

        // Events without an explicit name are called 'event {file}:{line}',
        // show where they come from instead
        let dim = Style::new().dim().force_styling(ansi);
        if metadata.name().starts_with("event ") {
            let target = match metadata.line() {
                Some(line) => format!("{}:{line}", metadata.target()),
                None => metadata.target().to_owned(),
            };
            write!(&mut writer, "{} ", dim.apply_to(target))?;
        } else {
            write!(&mut writer, "{} ", dim.apply_to(metadata.name()))?;
        }

        // Prefix with the name of the tracing span we're in, if any
        if let Some(span) = ctx.lookup_current() {
            let name = Style::new()
                .bold()
                .force_styling(ansi)
                .apply_to(span.name());
            write!(&mut writer, "{name} - ")?;
        }

        DefaultFields::new().format_fields(writer.by_ref(), event)?;

        if let Some(trace_id) = tracemw_tower::current_trace_id() {
            let label = Style::new()
                .italic()
                .force_styling(ansi)
                .apply_to("trace.id");
            write!(&mut writer, " {label}={trace_id}")?;
        }

        writeln!(&mut writer)
    }
}

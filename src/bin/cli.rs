use campus_calendar::{
    CalendarSnapshot, EngineConfig, ResourceKind, ResourceRef, SchedulingEngine, Scope,
    load_holidays_from_csv, load_snapshot_from_json, logging, save_snapshot_to_json,
};
use chrono::{NaiveDate, NaiveTime, Weekday};
use polars::prelude::{AnyValue, DataFrame};
use std::io::{self, Write};

fn cell_text(av: &AnyValue) -> String {
    match av {
        AnyValue::Null => String::new(),
        AnyValue::Int32(v) => v.to_string(),
        AnyValue::Int64(v) => v.to_string(),
        AnyValue::Float64(v) => format!("{v:.1}"),
        AnyValue::Boolean(v) => v.to_string(),
        AnyValue::String(s) => s.to_string(),
        _ => av.to_string(),
    }
}

fn render_df_as_text_table(df: &DataFrame) -> String {
    let columns = df.get_columns();
    let col_names: Vec<String> = columns.iter().map(|c| c.name().to_string()).collect();

    let cells: Vec<Vec<String>> = (0..df.height())
        .map(|row_idx| {
            columns
                .iter()
                .map(|col| col.get(row_idx).map(|av| cell_text(&av)).unwrap_or_default())
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = col_names.iter().map(|n| n.len()).collect();
    for row in &cells {
        for (ci, s) in row.iter().enumerate() {
            widths[ci] = widths[ci].max(s.len());
        }
    }

    let mut sep = String::from("+");
    for w in &widths {
        sep.push_str(&"-".repeat(*w + 2));
        sep.push('+');
    }

    let render_row = |values: &[String]| {
        let mut line = String::from("|");
        for (ci, s) in values.iter().enumerate() {
            line.push(' ');
            line.push_str(s);
            line.push_str(&" ".repeat(widths[ci].saturating_sub(s.len())));
            line.push_str(" |");
        }
        line
    };

    let mut out = String::new();
    out.push_str(&sep);
    out.push('\n');
    out.push_str(&render_row(&col_names));
    out.push('\n');
    out.push_str(&sep);
    out.push('\n');
    for row in &cells {
        out.push_str(&render_row(row));
        out.push('\n');
    }
    out.push_str(&sep);
    out.push('\n');
    out
}

fn print_help() {
    println!(
        "Commands:\n  help                                         Show this help\n  load <json_path>                             Load a calendar snapshot\n  save <json_path>                             Save the current snapshot\n  holidays import <csv_path>                   Append holidays from CSV\n  occurrences <pattern> <start> <end>          List pattern occurrences (YYYY-MM-DD)\n  available <facility|teacher> <id> <term> <weekday> <HH:MM> <HH:MM>\n                                               Check resource availability\n  days <class> <start> <end>                   List effective instructional days\n  stats <class> <start> <end>                  Attendance statistics for a class\n  excluded <date> [campus] [period]            Explain whether a date is excluded\n  config show                                  Show engine configuration\n  config set <json_path>                       Load engine configuration from JSON\n  quit|exit                                    Exit"
    );
}

fn parse_date(input: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(input, "%Y-%m-%d").ok()
}

fn parse_time(input: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(input, "%H:%M").ok()
}

fn parse_dates(start: Option<&str>, end: Option<&str>) -> Option<(NaiveDate, NaiveDate)> {
    Some((parse_date(start?)?, parse_date(end?)?))
}

fn print_config(config: &EngineConfig) {
    let categories = config
        .cancelling_categories
        .categories()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    println!("Max range days          : {}", config.max_range_days);
    println!("Cancelling categories   : {}", categories);
    println!("Low attendance threshold: {:.1}%", config.low_attendance_threshold);
    println!("Late counts as present  : {}", config.late_counts_as_present);
}

fn main() {
    logging::init();
    let config = EngineConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Ignoring invalid config: {e}");
        EngineConfig::default()
    });
    let mut engine = SchedulingEngine::with_config(CalendarSnapshot::default(), config);

    println!("Campus Calendar (CLI) - type 'help' for commands\n");

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        let _ = io::stdout().flush();
        line.clear();
        match stdin.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let mut parts = input.split_whitespace();
        let cmd = parts.next().unwrap_or("");

        match cmd {
            "help" => print_help(),
            "quit" | "exit" => break,
            "load" => match parts.next() {
                Some(path) => match load_snapshot_from_json(path) {
                    Ok(snapshot) => {
                        println!(
                            "Snapshot loaded from {path} ({} patterns, {} schedules, {} classes).",
                            snapshot.patterns.len(),
                            snapshot.schedules.len(),
                            snapshot.classes.len()
                        );
                        *engine.source_mut() = snapshot;
                    }
                    Err(e) => println!("Load error: {e}"),
                },
                None => println!("Usage: load <json_path>"),
            },
            "save" => match parts.next() {
                Some(path) => match save_snapshot_to_json(engine.source(), path) {
                    Ok(()) => println!("Snapshot saved to {path}."),
                    Err(e) => println!("Save error: {e}"),
                },
                None => println!("Usage: save <json_path>"),
            },
            "holidays" => match (parts.next(), parts.next()) {
                (Some("import"), Some(path)) => match load_holidays_from_csv(path) {
                    Ok(holidays) => {
                        let count = holidays.len();
                        let snapshot = engine.source_mut();
                        snapshot.holidays.retain(|h| !holidays.iter().any(|n| n.id == h.id));
                        snapshot.holidays.extend(holidays);
                        println!("Imported {count} holiday(s).");
                    }
                    Err(e) => println!("Import error: {e}"),
                },
                _ => println!("Usage: holidays import <csv_path>"),
            },
            "occurrences" => {
                let pattern_id = parts.next().and_then(|s| s.parse::<i32>().ok());
                let dates = parse_dates(parts.next(), parts.next());
                match (pattern_id, dates) {
                    (Some(pattern_id), Some((start, end))) => {
                        match engine.generate_occurrences(pattern_id, start, end) {
                            Ok(occurrences) if occurrences.is_empty() => {
                                println!("No occurrences.")
                            }
                            Ok(occurrences) => {
                                for occ in occurrences {
                                    match occ.rescheduled_from {
                                        Some(from) => println!(
                                            "{} {} (moved from {from})",
                                            occ.date,
                                            occ.time_range()
                                        ),
                                        None => println!("{} {}", occ.date, occ.time_range()),
                                    }
                                }
                            }
                            Err(e) => println!("Error: {e}"),
                        }
                    }
                    _ => println!("Usage: occurrences <pattern> <YYYY-MM-DD> <YYYY-MM-DD>"),
                }
            }
            "available" => {
                let kind = parts.next().and_then(|s| s.parse::<ResourceKind>().ok());
                let id = parts.next().and_then(|s| s.parse::<i32>().ok());
                let term = parts.next().and_then(|s| s.parse::<i32>().ok());
                let weekday = parts.next().and_then(|s| s.parse::<Weekday>().ok());
                let start = parts.next().and_then(parse_time);
                let end = parts.next().and_then(parse_time);
                match (kind, id, term, weekday, start, end) {
                    (Some(kind), Some(id), Some(term), Some(weekday), Some(start), Some(end)) => {
                        let resource = ResourceRef { kind, id };
                        match engine
                            .check_resource_availability(resource, term, weekday, start, end, None)
                        {
                            Ok(check) if check.available => {
                                println!("{resource} is available on {weekday} {}.", check.range)
                            }
                            Ok(check) => {
                                println!("{resource} is busy on {weekday} {}:", check.range);
                                for conflict in &check.conflicts {
                                    println!(
                                        "  schedule {} period {} class {} {}",
                                        conflict.schedule_id,
                                        conflict.period.id,
                                        conflict.period.period.class_id,
                                        conflict.period.period.time_range()
                                    );
                                }
                            }
                            Err(e) => println!("Error: {e}"),
                        }
                    }
                    _ => println!(
                        "Usage: available <facility|teacher> <id> <term> <weekday> <HH:MM> <HH:MM>"
                    ),
                }
            }
            "days" => {
                let class_id = parts.next().and_then(|s| s.parse::<i32>().ok());
                let dates = parse_dates(parts.next(), parts.next());
                match (class_id, dates) {
                    (Some(class_id), Some((start, end))) => {
                        match engine.compute_effective_days(class_id, start, end) {
                            Ok(days) => {
                                println!("{} effective day(s):", days.len());
                                for day in days {
                                    println!("  {day} {}", day.format("%a"));
                                }
                            }
                            Err(e) => println!("Error: {e}"),
                        }
                    }
                    _ => println!("Usage: days <class> <YYYY-MM-DD> <YYYY-MM-DD>"),
                }
            }
            "stats" => {
                let class_id = parts.next().and_then(|s| s.parse::<i32>().ok());
                let dates = parse_dates(parts.next(), parts.next());
                match (class_id, dates) {
                    (Some(class_id), Some((start, end))) => {
                        match engine.compute_attendance_stats(class_id, start, end) {
                            Ok(report) => {
                                println!(
                                    "Class {}: {} effective day(s), {} student(s), average attendance {:.1}%",
                                    report.class_id,
                                    report.effective_days,
                                    report.student_count,
                                    report.average_attendance
                                );
                                match report.to_dataframe() {
                                    Ok(df) => println!("{}", render_df_as_text_table(&df)),
                                    Err(e) => println!("Render error: {e}"),
                                }
                                let flagged = report.below_threshold();
                                if !flagged.is_empty() {
                                    let ids = flagged
                                        .iter()
                                        .map(|s| s.student_id.to_string())
                                        .collect::<Vec<_>>()
                                        .join(", ");
                                    println!(
                                        "Below {:.1}%: {ids}",
                                        report.low_attendance_threshold
                                    );
                                }
                            }
                            Err(e) => println!("Error: {e}"),
                        }
                    }
                    _ => println!("Usage: stats <class> <YYYY-MM-DD> <YYYY-MM-DD>"),
                }
            }
            "excluded" => {
                let date = parts.next().and_then(parse_date);
                let campus_id = parts.next().and_then(|s| s.parse::<i32>().ok());
                let academic_period_id = parts.next().and_then(|s| s.parse::<i32>().ok());
                match date {
                    Some(date) => {
                        let scope = Scope {
                            campus_id,
                            academic_period_id,
                        };
                        match engine.excluded_dates(date, date, scope) {
                            Ok(mut excluded) => match excluded.remove(&date) {
                                Some(reasons) => {
                                    println!("{date} is excluded:");
                                    for reason in reasons {
                                        println!("  {reason}");
                                    }
                                }
                                None => println!("{date} is an instructional day."),
                            },
                            Err(e) => println!("Error: {e}"),
                        }
                    }
                    None => println!("Usage: excluded <YYYY-MM-DD> [campus] [period]"),
                }
            }
            "config" => match (parts.next(), parts.next()) {
                (Some("show"), _) => print_config(engine.config()),
                (Some("set"), Some(path)) => match EngineConfig::from_json_file(path) {
                    Ok(config) => {
                        engine.set_config(config);
                        println!("Config loaded from {path}.");
                        print_config(engine.config());
                    }
                    Err(e) => println!("Config error: {e}"),
                },
                _ => println!("Usage: config show | config set <json_path>"),
            },
            _ => println!("Unknown command '{cmd}'. Type 'help' for commands."),
        }
    }
}

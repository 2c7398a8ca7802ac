use label_session::{ImageRow, LabelSession, WorkEvent};

const CELL_WIDTH: usize = 60;

/// Cuts `text` to `width` characters, marking the cut with `…`.
pub fn truncate(text: &str, width: usize) -> String {
    let text = text.replace('\n', " ");
    if text.chars().count() <= width {
        return text;
    }
    let mut cut = text.chars().take(width.saturating_sub(1)).collect::<String>();
    cut.push('…');
    cut
}

fn row_name(rows: &[ImageRow], row: usize) -> String {
    rows.get(row)
        .map(|v| v.file_name())
        .unwrap_or_else(|| format!("row {}", row))
}

/// One progress line per event, `None` for events with nothing to show.
pub fn event_line(event: &WorkEvent, rows: &[ImageRow]) -> Option<String> {
    let line = match event {
        WorkEvent::CaptionStarted { row } => format!("[{}] captioning {}", row, row_name(rows, *row)),
        WorkEvent::CaptionDone { row, .. } => {
            let caption = rows.get(*row).map(|v| v.caption.as_str()).unwrap_or_default();
            format!("[{}] captioned: {}", row, truncate(caption, CELL_WIDTH))
        }
        WorkEvent::CaptionFailed { row, error } => format!("[{}] {}", row, error),
        WorkEvent::BatchCaptionCompleted { succeeded, total } => {
            format!("captioned {}/{} images", succeeded, total)
        }
        WorkEvent::TranslationStarted { .. } => return None,
        WorkEvent::TranslationDone { row, text } => {
            format!("[{}] translated: {}", row, truncate(text, CELL_WIDTH))
        }
        WorkEvent::TranslationFailed { row, error } => format!("[{}] {}", row, error),
        WorkEvent::BatchTranslationCompleted { succeeded, total } => {
            format!("translated {}/{} captions", succeeded, total)
        }
        WorkEvent::Finished(_) => return None,
    };
    Some(line)
}

pub fn print_rows(session: &LabelSession) {
    if let Some(directory) = session.directory() {
        println!("{}", directory.display());
    }
    let trigger_word = session.trigger_word();
    if !trigger_word.is_empty() {
        println!("trigger word: {}", trigger_word);
    }

    for (index, row) in session.rows().iter().enumerate() {
        println!(
            "{:>4}  {:<32} {:<11} {}{}",
            index,
            truncate(&row.file_name(), 32),
            row.status.to_string(),
            truncate(&row.caption, CELL_WIDTH),
            if row.dirty { " *" } else { "" }
        );
        if !row.translation.is_empty() {
            println!("{:>4}  {:<32} {:<11} {}", "", "", "", truncate(&row.translation, CELL_WIDTH));
        }
    }

    if session.is_dirty() {
        println!("* unsaved changes");
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("line one\nline two", 40), "line one line two");
        assert_eq!(truncate("abcdefghij", 5), "abcd…");
        assert_eq!(truncate("一只猫坐在沙发上", 4), "一只猫…");
    }

    #[test]
    fn test_event_lines() {
        let line = event_line(
            &WorkEvent::BatchCaptionCompleted {
                succeeded: 2,
                total: 3,
            },
            &[],
        );
        assert_eq!(line.as_deref(), Some("captioned 2/3 images"));
        assert_eq!(
            event_line(&WorkEvent::CaptionStarted { row: 7 }, &[]).as_deref(),
            Some("[7] captioning row 7")
        );
        assert!(event_line(
            &WorkEvent::Finished(label_session::WorkKind::Caption),
            &[]
        )
        .is_none());
    }
}

use crate::{
    cli::{RunArgs, ShowArgs},
    render,
};
use ai::CaptionDispatcher;
use anyhow::bail;
use label_config::{ConfigStore, LabelerKind};
use label_session::{LabelSession, WorkEvent, WorkKind};
use std::sync::Arc;
use tracing::{info, warn};
use translation::ConfiguredTranslator;

fn new_session(store: Arc<ConfigStore>, labeler: Arc<CaptionDispatcher>) -> LabelSession {
    let translator = Arc::new(ConfiguredTranslator::new(store.clone()));
    LabelSession::new(store, labeler, translator)
}

/// Applies events until the operation of `kind` reports it is finished.
async fn wait_for(session: &mut LabelSession, kind: WorkKind) -> anyhow::Result<()> {
    while let Some(event) = session.next_event().await {
        if let Some(line) = render::event_line(&event, session.rows()) {
            println!("{}", line);
        }
        if event == WorkEvent::Finished(kind) {
            return Ok(());
        }
    }
    bail!("work channel closed before {} finished", kind)
}

pub async fn show(store: Arc<ConfigStore>, args: ShowArgs) -> anyhow::Result<()> {
    let labeler = Arc::new(CaptionDispatcher::new(store.clone()));
    let mut session = new_session(store, labeler);
    session.open_directory(&args.dir, false)?;
    render::print_rows(&session);
    Ok(())
}

pub async fn run(store: Arc<ConfigStore>, args: RunArgs) -> anyhow::Result<()> {
    let labeler = Arc::new(CaptionDispatcher::new(store.clone()));
    let mut session = new_session(store.clone(), labeler.clone());

    let count = session.open_directory(&args.dir, false)?;
    println!("{} images in {}", count, args.dir.display());

    if let Some(trigger_word) = &args.trigger {
        session.set_trigger_word(trigger_word);
    }
    session.set_backend_override(args.backend);

    let wants_captions = args.label_all || !args.label.is_empty();
    if wants_captions {
        let backend = session.backend();
        info!("captioning with {}", backend);
        if backend == LabelerKind::Local && !labeler.is_local_model_loaded() {
            println!("loading the local model, the first caption takes a while");
        }
        if session.directory_prompt().is_some() {
            println!("using the directory's own prompt");
        }
    }

    for row in &args.label {
        session.label_row(*row)?;
        wait_for(&mut session, WorkKind::Caption).await?;
    }

    if args.label_all {
        let overwrite = args.overwrite || store.labeling_config().overwrite_existing;
        let queued = session.label_all_with(overwrite)?;
        if queued == 0 {
            println!("every image already has a caption, pass --overwrite to redo them");
        }
        wait_for(&mut session, WorkKind::Caption).await?;
    }

    for row in &args.translate {
        session.translate_row(*row)?;
        wait_for(&mut session, WorkKind::Translation).await?;
    }

    if args.translate_all {
        session.translate_all()?;
        wait_for(&mut session, WorkKind::Translation).await?;
    }

    render::print_rows(&session);

    if args.save {
        let saved = session.save_all()?;
        println!("saved {} captions", saved);
    } else if session.is_dirty() {
        warn!("captions were changed but not saved");
        println!("captions not saved, rerun with --save to write them");
    }

    Ok(())
}

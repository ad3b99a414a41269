//! Pipeline executor integration tests using the scripted engine double.
//!
//! These tests verify:
//! - Stages run in their fixed dependency order regardless of request order
//! - Durable outputs land next to the source with measured dimensions
//! - Working artifacts never outlive a failed run
//! - Pack stages tolerate per-asset failures and report counts
//! - Previews stay scratch-only and respect the dimension cap

mod common;

use common::{DEFAULT_DIMS, FakeEngine, make_gif, make_image, utf8_dir};
use piclet::models::{
    PipelineRequest, ScaleMode, StageKind, StageParams, StoreEntry,
};
use piclet::services::{PipelineError, PipelineExecutor, PreviewGenerator, ScratchSpace};
use std::fs;
use std::sync::Arc;

const WHITE: Option<&str> = Some("srgb(255,255,255)");

fn removebg() -> StageParams {
    StageParams::RemoveBackground {
        fuzz: 10,
        trim: false,
        preserve_inner: false,
        edge_detect: false,
        edge_strength: 2.0,
    }
}

fn scale(w: u32, h: u32) -> StageParams {
    StageParams::Scale {
        target_width: w,
        target_height: h,
        make_square: false,
    }
}

fn position(calls: &[String], op: &str) -> usize {
    calls
        .iter()
        .position(|c| c == op)
        .unwrap_or_else(|| panic!("{op} was never called: {calls:?}"))
}

#[tokio::test]
async fn test_stages_execute_in_dependency_order() {
    let dir = tempfile::tempdir().unwrap();
    let root = utf8_dir(&dir);
    let engine = Arc::new(FakeEngine::new());
    let source = make_image(&root, "cat.png", &engine, (800, 600));
    let scratch = ScratchSpace::new().unwrap();

    // Scale listed first; removebg must still run before it.
    let request = PipelineRequest::new(vec![scale(400, 400), removebg()]);
    let executor = PipelineExecutor::new(Arc::clone(&engine));
    executor
        .execute(&source, &source, &request, WHITE, &scratch)
        .await
        .unwrap();

    let calls = engine.recorded_calls();
    assert!(position(&calls, "remove_background_global") < position(&calls, "resize_exact"));
}

#[tokio::test]
async fn test_scale_output_named_from_source_with_dims() {
    let dir = tempfile::tempdir().unwrap();
    let root = utf8_dir(&dir);
    let engine = Arc::new(FakeEngine::new());
    let source = make_image(&root, "cat.png", &engine, (800, 600));
    let scratch = ScratchSpace::new().unwrap();

    let request = PipelineRequest::new(vec![scale(400, 400)]);
    let executor = PipelineExecutor::new(Arc::clone(&engine));
    let result = executor
        .execute(&source, &source, &request, None, &scratch)
        .await
        .unwrap();

    let expected = root.join("cat_scaled-400x400.png");
    assert!(expected.exists());
    assert_eq!(result.outputs.len(), 1);
    assert_eq!(result.outputs[0].path, expected);
    assert_eq!(result.primary_output, Some(expected));
}

#[tokio::test]
async fn test_empty_request_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let root = utf8_dir(&dir);
    let engine = Arc::new(FakeEngine::new());
    let source = make_image(&root, "cat.png", &engine, DEFAULT_DIMS);
    let scratch = ScratchSpace::new().unwrap();

    let executor = PipelineExecutor::new(Arc::clone(&engine));
    let result = executor
        .execute(&source, &source, &PipelineRequest::default(), None, &scratch)
        .await;

    assert!(matches!(result, Err(PipelineError::InvalidInput(_))));
}

#[tokio::test]
async fn test_unreadable_input_fails_before_any_stage() {
    let dir = tempfile::tempdir().unwrap();
    let root = utf8_dir(&dir);
    let engine = Arc::new(FakeEngine::new());
    let scratch = ScratchSpace::new().unwrap();
    let missing = root.join("nope.png");

    let executor = PipelineExecutor::new(Arc::clone(&engine));
    let result = executor
        .execute(
            &missing,
            &missing,
            &PipelineRequest::new(vec![scale(100, 100)]),
            None,
            &scratch,
        )
        .await;

    assert!(matches!(result, Err(PipelineError::InvalidInput(_))));
    // Only the upfront readability probe ran.
    assert_eq!(engine.recorded_calls(), vec!["dimensions"]);
}

#[tokio::test]
async fn test_invalid_stage_params_fail_without_engine_work() {
    let dir = tempfile::tempdir().unwrap();
    let root = utf8_dir(&dir);
    let engine = Arc::new(FakeEngine::new());
    let source = make_image(&root, "cat.png", &engine, DEFAULT_DIMS);
    let scratch = ScratchSpace::new().unwrap();

    // Icon generation with no output format selected can never succeed.
    let request = PipelineRequest::new(vec![StageParams::IconGeneration {
        trim: false,
        make_square: false,
        single_icon: false,
        web_pack: false,
        android_pack: false,
        ios_pack: false,
    }]);
    let executor = PipelineExecutor::new(Arc::clone(&engine));
    let result = executor
        .execute(&source, &source, &request, None, &scratch)
        .await;

    match result {
        Err(PipelineError::StageFailed { stage, .. }) => {
            assert_eq!(stage, StageKind::IconGeneration);
        }
        other => panic!("expected StageFailed, got {other:?}"),
    }
    assert_eq!(engine.recorded_calls(), vec!["dimensions"]);
}

#[tokio::test]
async fn test_failed_run_leaves_no_scratch_files() {
    let dir = tempfile::tempdir().unwrap();
    let root = utf8_dir(&dir);
    let engine = Arc::new(FakeEngine::new());
    let source = make_image(&root, "cat.png", &engine, DEFAULT_DIMS);
    let scratch = ScratchSpace::new().unwrap();
    engine.fail_on("resize_exact");

    let request = PipelineRequest::new(vec![removebg(), scale(100, 100)]);
    let executor = PipelineExecutor::new(Arc::clone(&engine));
    let result = executor
        .execute(&source, &source, &request, WHITE, &scratch)
        .await;

    match result {
        Err(PipelineError::StageFailed { stage, log }) => {
            assert_eq!(stage, StageKind::Scale);
            // The log keeps the completed removebg line plus the failure.
            assert!(log.iter().any(|l| l.contains("removebg")));
            assert!(log.iter().any(|l| l.contains("injected failure")));
        }
        other => panic!("expected StageFailed, got {other:?}"),
    }

    // The removebg intermediate must be gone.
    let leftovers: Vec<_> = scratch.dir().read_dir_utf8().unwrap().collect();
    assert!(leftovers.is_empty(), "scratch not cleaned: {leftovers:?}");
}

#[tokio::test]
async fn test_removebg_falls_back_through_strategies() {
    let dir = tempfile::tempdir().unwrap();
    let root = utf8_dir(&dir);
    let engine = Arc::new(FakeEngine::new());
    let source = make_image(&root, "cat.png", &engine, DEFAULT_DIMS);
    let scratch = ScratchSpace::new().unwrap();
    engine.fail_on("remove_background_edge_feather");

    let request = PipelineRequest::new(vec![StageParams::RemoveBackground {
        fuzz: 10,
        trim: false,
        preserve_inner: false,
        edge_detect: true,
        edge_strength: 2.0,
    }]);
    let executor = PipelineExecutor::new(Arc::clone(&engine));
    let result = executor
        .execute(&source, &source, &request, WHITE, &scratch)
        .await
        .unwrap();

    let calls = engine.recorded_calls();
    assert!(
        position(&calls, "remove_background_edge_feather")
            < position(&calls, "remove_background_global")
    );
    assert!(result.log.iter().any(|l| l.contains("trying next")));
    // Durable name embeds the measured dimensions of the fallback result.
    assert!(root.join("cat_nobg-200x150.png").exists());
}

#[tokio::test]
async fn test_working_artifacts_keep_animated_container() {
    let dir = tempfile::tempdir().unwrap();
    let root = utf8_dir(&dir);
    let engine = Arc::new(FakeEngine::new());
    let source = make_gif(&root, "anim.gif", &engine, 3, 10);
    let scratch = ScratchSpace::new().unwrap();

    let request = PipelineRequest::new(vec![removebg(), scale(100, 100)]);
    let executor = PipelineExecutor::new(Arc::clone(&engine));
    executor
        .execute(&source, &source, &request, WHITE, &scratch)
        .await
        .unwrap();

    // Every intermediate stays in the source container; a .png extension
    // here would make the engine splinter the animation into numbered files.
    for out in engine.outputs_for("remove_background_global") {
        assert_eq!(out.extension(), Some("gif"), "removebg wrote {out}");
    }
    for out in engine.outputs_for("resize_exact") {
        assert_eq!(out.extension(), Some("gif"), "scale wrote {out}");
    }
    assert!(root.join("anim_scaled-100x100.gif").exists());
}

#[tokio::test]
async fn test_working_artifacts_keep_still_container() {
    let dir = tempfile::tempdir().unwrap();
    let root = utf8_dir(&dir);
    let engine = Arc::new(FakeEngine::new());
    let source = make_image(&root, "photo.jpg", &engine, (800, 600));
    let scratch = ScratchSpace::new().unwrap();

    let request = PipelineRequest::new(vec![scale(100, 100)]);
    let executor = PipelineExecutor::new(Arc::clone(&engine));
    executor
        .execute(&source, &source, &request, None, &scratch)
        .await
        .unwrap();

    // The bytes under photo_scaled-100x100.jpg really are JPEG-encoded.
    let resized = engine.outputs_for("resize_exact");
    assert_eq!(resized.len(), 1);
    assert_eq!(resized[0].extension(), Some("jpg"));
    assert!(root.join("photo_scaled-100x100.jpg").exists());
}

#[tokio::test]
async fn test_removebg_without_background_color_fails() {
    let dir = tempfile::tempdir().unwrap();
    let root = utf8_dir(&dir);
    let engine = Arc::new(FakeEngine::new());
    let source = make_image(&root, "cat.png", &engine, DEFAULT_DIMS);
    let scratch = ScratchSpace::new().unwrap();

    let request = PipelineRequest::new(vec![removebg()]);
    let executor = PipelineExecutor::new(Arc::clone(&engine));
    let result = executor
        .execute(&source, &source, &request, None, &scratch)
        .await;

    match result {
        Err(PipelineError::StageFailed { stage, log }) => {
            assert_eq!(stage, StageKind::RemoveBackground);
            assert!(log.iter().any(|l| l.contains("background color")));
        }
        other => panic!("expected StageFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_store_pack_tolerates_per_entry_failures() {
    let dir = tempfile::tempdir().unwrap();
    let root = utf8_dir(&dir);
    let engine = Arc::new(FakeEngine::new());
    let source = make_image(&root, "cat.png", &engine, DEFAULT_DIMS);
    let scratch = ScratchSpace::new().unwrap();
    engine.fail_on("scale_with_padding");

    let request = PipelineRequest::new(vec![StageParams::StorePack {
        entries: vec![StoreEntry::new(100, 100), StoreEntry::new(200, 100)],
        scale_mode: ScaleMode::Fit,
        pack_name: Some("msstore".to_string()),
    }]);
    let executor = PipelineExecutor::new(Arc::clone(&engine));
    let result = executor
        .execute(&source, &source, &request, None, &scratch)
        .await
        .unwrap();

    // Partial failure is a count, not an error.
    assert_eq!(result.outputs.len(), 1);
    let pack = &result.outputs[0];
    assert_eq!(pack.path, root.join("cat_msstore"));
    assert_eq!(pack.generated, 0);
    assert_eq!(pack.requested, 2);
    assert!(!pack.is_complete());
    assert!(pack.path.is_dir());
}

#[tokio::test]
async fn test_store_pack_writes_named_entries() {
    let dir = tempfile::tempdir().unwrap();
    let root = utf8_dir(&dir);
    let engine = Arc::new(FakeEngine::new());
    let source = make_image(&root, "cat.png", &engine, DEFAULT_DIMS);
    let scratch = ScratchSpace::new().unwrap();

    let request = PipelineRequest::new(vec![StageParams::StorePack {
        entries: vec![
            StoreEntry {
                width: 44,
                height: 44,
                filename: Some("Square44x44Logo.png".to_string()),
            },
            StoreEntry::new(310, 150),
        ],
        scale_mode: ScaleMode::Fill,
        pack_name: None,
    }]);
    let executor = PipelineExecutor::new(Arc::clone(&engine));
    let result = executor
        .execute(&source, &source, &request, None, &scratch)
        .await
        .unwrap();

    let pack_dir = root.join("cat_storepack");
    assert!(pack_dir.join("Square44x44Logo.png").exists());
    assert!(pack_dir.join("310x150.png").exists());
    assert!(result.outputs[0].is_complete());
}

#[tokio::test]
async fn test_single_icon_lands_next_to_source() {
    let dir = tempfile::tempdir().unwrap();
    let root = utf8_dir(&dir);
    let engine = Arc::new(FakeEngine::new());
    let source = make_image(&root, "logo.png", &engine, DEFAULT_DIMS);
    let scratch = ScratchSpace::new().unwrap();

    let request = PipelineRequest::new(vec![StageParams::IconGeneration {
        trim: false,
        make_square: false,
        single_icon: true,
        web_pack: false,
        android_pack: false,
        ios_pack: false,
    }]);
    let executor = PipelineExecutor::new(Arc::clone(&engine));
    let result = executor
        .execute(&source, &source, &request, None, &scratch)
        .await
        .unwrap();

    assert!(root.join("logo.ico").exists());
    assert_eq!(result.primary_output, Some(root.join("logo.ico")));
}

#[tokio::test]
async fn test_web_pack_includes_favicon_container() {
    let dir = tempfile::tempdir().unwrap();
    let root = utf8_dir(&dir);
    let engine = Arc::new(FakeEngine::new());
    let source = make_image(&root, "logo.png", &engine, DEFAULT_DIMS);
    let scratch = ScratchSpace::new().unwrap();

    let request = PipelineRequest::new(vec![StageParams::IconGeneration {
        trim: false,
        make_square: true,
        single_icon: false,
        web_pack: true,
        android_pack: false,
        ios_pack: false,
    }]);
    let executor = PipelineExecutor::new(Arc::clone(&engine));
    let result = executor
        .execute(&source, &source, &request, None, &scratch)
        .await
        .unwrap();

    let web_dir = root.join("logo_icons").join("web");
    assert!(web_dir.join("favicon-32x32.png").exists());
    assert!(web_dir.join("favicon.ico").exists());
    assert!(result.outputs[0].is_complete());
}

#[tokio::test]
async fn test_preview_reflects_original_without_transforms() {
    let dir = tempfile::tempdir().unwrap();
    let root = utf8_dir(&dir);
    let engine = Arc::new(FakeEngine::new());
    let source = make_image(&root, "cat.png", &engine, DEFAULT_DIMS);
    let scratch = ScratchSpace::new().unwrap();

    let mut request = PipelineRequest::new(vec![scale(400, 400)]);
    request.original_image = true;

    let preview = PreviewGenerator::new(Arc::clone(&engine), 512);
    let result = preview
        .preview(&source, &request, None, &scratch, false)
        .await
        .unwrap();

    assert_eq!((result.width, result.height), DEFAULT_DIMS);
    assert!(!engine.recorded_calls().iter().any(|c| c == "resize_exact"));

    use base64::Engine as _;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(&result.image_data)
        .unwrap();
    assert_eq!(bytes, fs::read(&source).unwrap());
}

#[tokio::test]
async fn test_preview_caps_dimensions_preserving_aspect() {
    let dir = tempfile::tempdir().unwrap();
    let root = utf8_dir(&dir);
    let engine = Arc::new(FakeEngine::new());
    let source = make_image(&root, "big.png", &engine, (800, 600));
    let scratch = ScratchSpace::new().unwrap();

    let preview = PreviewGenerator::new(Arc::clone(&engine), 512);
    let result = preview
        .preview(&source, &PipelineRequest::default(), None, &scratch, false)
        .await
        .unwrap();

    assert_eq!((result.width, result.height), (512, 384));
}

#[tokio::test]
async fn test_preview_never_writes_to_source_directory() {
    let dir = tempfile::tempdir().unwrap();
    let root = utf8_dir(&dir);
    let engine = Arc::new(FakeEngine::new());
    let source = make_image(&root, "cat.png", &engine, (800, 600));
    let scratch = ScratchSpace::new().unwrap();

    let request = PipelineRequest::new(vec![removebg(), scale(400, 400)]);
    let preview = PreviewGenerator::new(Arc::clone(&engine), 512);
    preview
        .preview(&source, &request, WHITE, &scratch, false)
        .await
        .unwrap();

    let entries: Vec<_> = root
        .read_dir_utf8()
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string())
        .collect();
    assert_eq!(entries, vec!["cat.png"]);
}

#[tokio::test]
async fn test_full_resolution_preview_skips_the_cap() {
    let dir = tempfile::tempdir().unwrap();
    let root = utf8_dir(&dir);
    let engine = Arc::new(FakeEngine::new());
    let source = make_image(&root, "big.png", &engine, (2000, 1000));
    let scratch = ScratchSpace::new().unwrap();

    let preview = PreviewGenerator::new(Arc::clone(&engine), 512);
    let result = preview
        .preview(&source, &PipelineRequest::default(), None, &scratch, true)
        .await
        .unwrap();

    assert_eq!((result.width, result.height), (2000, 1000));
}

mod properties {
    use camino::Utf8PathBuf;
    use piclet::services::derive_output_path;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn derived_output_stays_in_source_directory(
            name in "[a-z]{1,12}",
            w in 1u32..8000,
            h in 1u32..8000,
        ) {
            let source = Utf8PathBuf::from(format!("/pics/{name}.png"));
            let out = derive_output_path(&source, "_scaled", Some((w, h)), "png");

            prop_assert_eq!(out.parent().unwrap(), "/pics");
            let expected = format!("{name}_scaled-{w}x{h}.png");
            prop_assert_eq!(out.file_name().unwrap(), expected.as_str());
        }

        #[test]
        fn simplify_keeps_ceiling_of_count_over_skip(
            count in 2usize..500,
            skip in 2usize..10,
        ) {
            // Frames at indexes 0, skip, 2*skip, ... survive.
            let survivors = (0..count).filter(|i| i % skip == 0).count();
            prop_assert_eq!(survivors, count.div_ceil(skip));
        }
    }
}

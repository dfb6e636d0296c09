//! Pipeline Tests
//!
//! End-to-end tests driving the full renderer against the recording
//! device:
//! - View registration and priority bands
//! - Post chain: ping-pong contract, feature ordering and stability,
//!   begin/finish overrides
//! - Resize: rebuild idempotence, allocation-failure degradation
//! - Frame submission: cascade draws, shadow composite, light pass
//!   bindings, skinned shader selection

use std::cell::RefCell;
use std::rc::Rc;

use glam::{Mat4, Vec3, Vec4};
use smallvec::SmallVec;

use ember_render::gfx::{
    Backend, IndexBufferHandle, NullShaderLibrary, RecordingDevice, ShaderLibrary,
    VertexBufferHandle,
};
use ember_render::{
    DrawItem, PostContext, PostFeature, RenderError, Renderer, RendererSettings,
};

fn make_renderer(width: u32, height: u32) -> (Renderer<RecordingDevice>, NullShaderLibrary) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut shaders = NullShaderLibrary::new();
    let renderer = Renderer::new(
        RecordingDevice::new(Backend::Noop),
        &mut shaders,
        width,
        height,
        RendererSettings::default(),
    )
    .expect("renderer init");
    (renderer, shaders)
}

fn caster(transform_count: usize) -> DrawItem {
    DrawItem {
        transforms: SmallVec::from_slice(&vec![Mat4::IDENTITY; transform_count]),
        vertex_buffer: VertexBufferHandle(1),
        index_buffer: IndexBufferHandle(1),
        casts_shadow: true,
    }
}

fn set_test_camera(renderer: &mut Renderer<RecordingDevice>) {
    let view = Mat4::look_at_lh(Vec3::new(0.0, 5.0, -10.0), Vec3::ZERO, Vec3::Y);
    let proj = Mat4::perspective_lh(1.0, 16.0 / 9.0, 0.1, 1000.0);
    renderer.set_camera(view, proj, 0.1, 1000.0);
    renderer.set_directional_light(Vec3::new(1.0, -1.0, 0.3), Vec4::ONE);
}

// ============================================================================
// View registration
// ============================================================================

#[test]
fn views_land_in_their_priority_bands() {
    let (renderer, _) = make_renderer(1280, 720);
    let views = renderer.views();

    let expect = [
        ("ShadowMap_Cascade0", 500),
        ("ShadowMap_Cascade3", 503),
        ("DeferredGeometry", 1000),
        ("ShadowBuffer", 1100),
        ("DeferredLight", 1500),
        ("RenderLayer0", 2000),
        ("TransparencyBuffer", 3000),
        ("TransparencyFinal", 3001),
        ("Post_Begin", 4000),
        ("Post_Finish", 5000),
    ];
    for (name, priority) in expect {
        let id = views.lookup(name).unwrap_or_else(|| panic!("missing view {name}"));
        assert_eq!(views.priority(id), priority, "{name}");
    }
}

// ============================================================================
// Post chain
// ============================================================================

struct TestFeature {
    name: &'static str,
    priority: u16,
    log: Rc<RefCell<Vec<&'static str>>>,
}

impl PostFeature for TestFeature {
    fn name(&self) -> &'static str {
        self.name
    }

    fn priority(&self) -> u16 {
        self.priority
    }

    fn render(&mut self, _ctx: &mut PostContext<'_, '_>) {
        self.log.borrow_mut().push(self.name);
    }
}

#[test]
fn ping_pong_flip_swaps_source_and_target() {
    let (mut renderer, _) = make_renderer(640, 480);
    let post = renderer.post_mut();

    let source = post.source_framebuffer();
    let target = post.target_framebuffer();
    assert_ne!(source, target);

    post.flip();
    assert_eq!(post.source_framebuffer(), target);
    assert_eq!(post.target_framebuffer(), source);
}

#[test]
fn features_run_in_ascending_priority_order() {
    let (mut renderer, _) = make_renderer(640, 480);
    set_test_camera(&mut renderer);
    let log = Rc::new(RefCell::new(Vec::new()));

    for (name, priority) in [("late", 5000), ("early", 100), ("mid", 3000)] {
        renderer.post_mut().add_feature(Box::new(TestFeature {
            name,
            priority,
            log: Rc::clone(&log),
        }));
    }
    assert_eq!(
        renderer.post().feature_order(),
        vec!["early", "mid", "late"]
    );

    renderer.render_frame(&[]);
    assert_eq!(*log.borrow(), vec!["early", "mid", "late"]);
}

#[test]
fn equal_priorities_keep_registration_order() {
    let (mut renderer, _) = make_renderer(640, 480);
    let log = Rc::new(RefCell::new(Vec::new()));

    for name in ["first", "second", "third"] {
        renderer.post_mut().add_feature(Box::new(TestFeature {
            name,
            priority: 100,
            log: Rc::clone(&log),
        }));
    }
    renderer.post_mut().add_feature(Box::new(TestFeature {
        name: "later-band",
        priority: 200,
        log: Rc::clone(&log),
    }));

    assert_eq!(
        renderer.post().feature_order(),
        vec!["first", "second", "third", "later-band"]
    );
}

#[test]
fn every_feature_advances_the_ping_pong() {
    let (mut renderer, _) = make_renderer(640, 480);
    set_test_camera(&mut renderer);
    let log = Rc::new(RefCell::new(Vec::new()));
    renderer.post_mut().add_feature(Box::new(TestFeature {
        name: "only",
        priority: 100,
        log,
    }));

    let start = renderer.post().source_framebuffer();
    renderer.render_frame(&[]);
    // Begin flips once, the single feature flips once: back where we began.
    assert_eq!(renderer.post().source_framebuffer(), start);
}

#[test]
fn override_finish_disables_default_pass_permanently() {
    let (mut renderer, _) = make_renderer(640, 480);
    set_test_camera(&mut renderer);

    let finish_view = renderer.post_mut().override_finish();

    renderer.render_frame(&[]);
    renderer.render_frame(&[]);
    assert_eq!(
        renderer.device().submissions_to(finish_view).count(),
        0,
        "default finish pass must stay disabled"
    );
}

#[test]
fn overriding_feature_owns_the_finish_view() {
    let (mut renderer, mut shaders) = make_renderer(640, 480);
    set_test_camera(&mut renderer);

    let finish_view = renderer.post_mut().override_finish();
    let fxaa = ember_render::features::Fxaa::new(finish_view, &mut shaders);
    let fxaa_shader = shaders.shader("fxaa/final_vs", "fxaa/final_fxaa_fs");
    renderer.post_mut().add_feature(Box::new(fxaa));

    renderer.render_frame(&[]);

    let finish: Vec<_> = renderer.device().submissions_to(finish_view).collect();
    assert_eq!(finish.len(), 1);
    assert_eq!(finish[0].program, fxaa_shader);
    assert!(finish[0].full_screen_quad);
}

// ============================================================================
// Resize
// ============================================================================

#[test]
fn resize_rebuilds_without_leaking() {
    let (mut renderer, _) = make_renderer(1280, 720);
    let live_before = renderer.device().live_texture_count();

    renderer.resize(1920, 1080).unwrap();
    assert_eq!(renderer.device().live_texture_count(), live_before);

    // Same-size resize still rebuilds and still balances.
    let created = renderer.device().textures_created();
    renderer.resize(1920, 1080).unwrap();
    assert!(renderer.device().textures_created() > created);
    assert_eq!(renderer.device().live_texture_count(), live_before);
}

#[test]
fn zero_dimensions_are_rejected() {
    let (mut renderer, _) = make_renderer(1280, 720);
    assert!(matches!(
        renderer.resize(0, 720),
        Err(RenderError::InvalidDimensions { .. })
    ));

    let mut shaders = NullShaderLibrary::new();
    let result = Renderer::new(
        RecordingDevice::new(Backend::Noop),
        &mut shaders,
        1280,
        0,
        RendererSettings::default(),
    );
    assert!(result.is_err());
}

#[test]
fn allocation_failure_degrades_instead_of_panicking() {
    let (mut renderer, _) = make_renderer(1280, 720);
    set_test_camera(&mut renderer);

    // First allocation of the resize fails: the shared planes go down and
    // every stage borrowing them ends up with invalid targets.
    renderer.device_mut().fail_next_texture_creates(1);
    assert!(matches!(
        renderer.resize(1920, 1080),
        Err(RenderError::ResourceAllocation { .. })
    ));

    renderer.device_mut().clear_submissions();
    renderer.render_frame(&[caster(1)]);

    let combine_view = renderer.views().lookup("RenderLayer0").unwrap();
    assert_eq!(
        renderer.device().submissions_to(combine_view).count(),
        0,
        "combine must be skipped while the G-Buffer is invalid"
    );

    // A later resize recovers the whole pipeline.
    renderer.resize(1920, 1080).unwrap();
    renderer.device_mut().clear_submissions();
    renderer.render_frame(&[caster(1)]);
    assert_eq!(renderer.device().submissions_to(combine_view).count(), 1);
}

// ============================================================================
// Frame submission
// ============================================================================

#[test]
fn one_caster_draws_into_every_cascade() {
    let (mut renderer, mut shaders) = make_renderer(1920, 1080);
    set_test_camera(&mut renderer);
    renderer.device_mut().clear_submissions();

    renderer.render_frame(&[caster(1)]);

    let vsm = shaders.shader("shadow/vsm_vs", "shadow/vsm_fs");
    for i in 0..4 {
        let name = format!("ShadowMap_Cascade{i}");
        let view = renderer.views().lookup(&name).unwrap();
        let subs: Vec<_> = renderer
            .device()
            .submissions_to(view)
            .filter(|s| !s.full_screen_quad)
            .collect();
        assert_eq!(subs.len(), 1, "{name}");
        assert_eq!(subs[0].program, vsm);
        assert_eq!(subs[0].transform_count, 1);
        assert_eq!(subs[0].vertex_buffer, Some(VertexBufferHandle(1)));
    }

    let shadow_view = renderer.views().lookup("ShadowBuffer").unwrap();
    let composite: Vec<_> = renderer.device().submissions_to(shadow_view).collect();
    assert_eq!(composite.len(), 1);
    // Depth plus the four cascade textures.
    assert_eq!(composite[0].textures.len(), 5);
}

#[test]
fn light_pass_samples_the_shadow_buffer() {
    let (mut renderer, _) = make_renderer(1920, 1080);
    set_test_camera(&mut renderer);
    renderer.device_mut().clear_submissions();

    renderer.render_frame(&[caster(1)]);

    let shadow_texture = renderer.light().shadow_texture();
    assert!(shadow_texture.is_valid());

    let light_view = renderer.views().lookup("DeferredLight").unwrap();
    let subs: Vec<_> = renderer.device().submissions_to(light_view).collect();
    assert_eq!(subs.len(), 1);
    assert!(
        subs[0].textures.contains(&(3, shadow_texture)),
        "light pass must bind the shadow buffer at slot 3"
    );
}

#[test]
fn skinned_casters_use_the_skinned_shader() {
    let (mut renderer, mut shaders) = make_renderer(1920, 1080);
    set_test_camera(&mut renderer);
    renderer.device_mut().clear_submissions();

    renderer.render_frame(&[caster(1), caster(4)]);

    let vsm = shaders.shader("shadow/vsm_vs", "shadow/vsm_fs");
    let vsm_skinned = shaders.shader("shadow/vsm_skinned_vs", "shadow/vsm_fs");
    assert_ne!(vsm, vsm_skinned);

    let view = renderer.views().lookup("ShadowMap_Cascade0").unwrap();
    let programs: Vec<_> = renderer
        .device()
        .submissions_to(view)
        .filter(|s| !s.full_screen_quad)
        .map(|s| (s.program, s.transform_count))
        .collect();
    assert_eq!(programs, vec![(vsm, 1), (vsm_skinned, 4)]);
}

#[test]
fn disabled_shadows_submit_nothing() {
    let (mut renderer, _) = make_renderer(1280, 720);
    set_test_camera(&mut renderer);
    renderer.light_mut().set_enabled(false);
    renderer.device_mut().clear_submissions();

    renderer.render_frame(&[caster(1)]);

    for name in ["ShadowMap_Cascade0", "ShadowBuffer", "DeferredLight"] {
        let view = renderer.views().lookup(name).unwrap();
        assert_eq!(renderer.device().submissions_to(view).count(), 0, "{name}");
    }
}

#[test]
fn transparency_composites_into_the_post_source() {
    let (mut renderer, _) = make_renderer(1280, 720);
    set_test_camera(&mut renderer);

    let post_source = renderer.post().source_framebuffer();
    renderer.device_mut().clear_submissions();
    renderer.render_frame(&[]);

    let final_view = renderer.views().lookup("TransparencyFinal").unwrap();
    let state = renderer.device().view_state(final_view).unwrap();
    assert_eq!(state.frame_buffer, Some(post_source));
    assert_eq!(renderer.device().submissions_to(final_view).count(), 1);
}

#[test]
fn shutdown_releases_every_resource() {
    let (renderer, _) = make_renderer(1280, 720);
    let device = renderer.shutdown();
    assert_eq!(device.live_texture_count(), 0);
    assert_eq!(device.live_frame_buffer_count(), 0);
}

use std::{f32::consts::FRAC_PI_2, time::Duration};

use tv_scene::{
    camera::ArcRotateCamera,
    data_structures::scene_graph::{Ray, ReadyAction, SceneGraph},
    inspector,
    loading::{LoadingState, LoadingUi},
    resources::{MODEL_ROOT, parse_gltf},
    scene::{CameraIntro, Stage, setup, setup_camera, setup_lights},
};

use crate::common::{Recorder, tv_glb};

mod common;

struct Loaded {
    graph: SceneGraph,
    camera: Stage<ArcRotateCamera>,
    loading: LoadingUi,
    recorder: Recorder,
    model: setup::TvModel,
}

/// Parse the model and run it through every setup stage, the way the scene does on load.
fn load() -> Loaded {
    let data = futures::executor::block_on(parse_gltf("models/tv.glb", &tv_glb())).unwrap();
    assert_eq!(data.meshes.len(), 4);

    let mut graph = SceneGraph::new();
    let nodes = graph.append(data.graph);
    let mut camera = Stage::Ready(setup_camera());
    let recorder = Recorder::default();
    let mut loading = LoadingUi::new(Box::new(recorder.clone()));
    loading.display();

    let model = setup::wire_model(&mut graph, nodes, &mut camera, "videoplayback.gif", &mut loading);
    Loaded {
        graph,
        camera,
        loading,
        recorder,
        model,
    }
}

fn id(graph: &SceneGraph, name: &str) -> usize {
    graph.get_node_by_name(name).unwrap()
}

#[test]
fn loaded_model_is_frozen_except_for_the_screen() {
    let Loaded { graph, model, .. } = load();

    let mut frozen = model.frozen.clone();
    frozen.sort_unstable();
    let mut expected: Vec<usize> = [MODEL_ROOT, "Cabinet", "Book", "Plant"]
        .iter()
        .map(|name| id(&graph, name))
        .collect();
    expected.sort_unstable();
    assert_eq!(frozen, expected);

    for id in &model.frozen {
        let flags = graph.node(*id).unwrap().flags();
        assert!(!flags.pickable);
        assert!(!flags.sync_bounding_info);
        assert!(flags.world_matrix_frozen);
    }
    let screen = graph.node(id(&graph, "Screen")).unwrap().flags();
    assert!(screen.pickable && !screen.world_matrix_frozen);
    assert_eq!(model.shelf, Some(id(&graph, "Shelf")));
}

#[test]
fn screen_plays_the_video_and_the_camera_faces_it() {
    let Loaded {
        mut graph,
        camera,
        model,
        ..
    } = load();
    let screen = model.screen.unwrap();

    assert_eq!(screen.node, id(&graph, "Screen"));
    assert_eq!(graph.material(screen.material).unwrap().name, setup::SCREEN_MATERIAL);
    assert_eq!(graph.texture(screen.texture).unwrap().name, setup::VIDEO_TEXTURE);
    // glTF materials keep their ids, the screen material comes after them
    assert_eq!(screen.material, 2);
    assert_eq!(graph.material(0).unwrap().name, "wood");

    let Stage::Ready(camera) = camera else {
        panic!("camera was set up before the model loaded")
    };
    assert_eq!(camera.target(), cgmath::Point3::new(0.0, 1.0, 0.5));

    assert_eq!(
        graph.take_ready_action(screen.node),
        Some(ReadyAction::PlayVideo(screen.texture))
    );
    assert_eq!(graph.take_ready_action(screen.node), None);
}

#[test]
fn only_the_screen_can_be_picked() {
    let Loaded { graph, .. } = load();
    let towards = cgmath::Vector3::new(0.0, 0.0, -1.0);

    let screen = Ray::new(cgmath::Point3::new(0.5, 1.5, 5.0), towards);
    assert_eq!(graph.pick(&screen), Some(id(&graph, "Screen")));

    let cabinet = Ray::new(cgmath::Point3::new(0.5, 0.5, 5.0), towards);
    assert_eq!(graph.pick(&cabinet), None);

    let plant = Ray::new(cgmath::Point3::new(3.5, 1.5, 5.0), towards);
    assert_eq!(graph.pick(&plant), None);
}

#[test]
fn frozen_shelf_items_stay_put_when_the_shelf_moves() {
    let Loaded { mut graph, .. } = load();
    let shelf = id(&graph, "Shelf");
    let book = id(&graph, "Book");
    let before = graph.node(book).unwrap().bounding_box();

    graph.node_mut(shelf).unwrap().local.position = cgmath::Vector3::new(-3.0, 0.0, 0.0);
    let updated = graph.update_world_matrices();

    assert!(updated.contains(&shelf));
    assert!(!updated.contains(&book));
    assert_eq!(graph.node(book).unwrap().world_position(), cgmath::Point3::new(3.0, 0.0, 0.0));
    assert_eq!(graph.node(book).unwrap().bounding_box(), before);
}

#[test]
fn loading_indicator_is_hidden_once_wired() {
    let Loaded {
        mut loading,
        recorder,
        ..
    } = load();
    assert_eq!(loading.state(), LoadingState::Hidden);
    assert!(!loading.hide());
    assert_eq!(*recorder.0.borrow(), vec!["display", "hide"]);
}

#[test]
fn camera_takes_input_only_after_the_intro() {
    let mut camera = setup_camera();
    let mut intro = CameraIntro::new();
    let frame = Duration::from_millis(16);

    let mut elapsed = Duration::ZERO;
    while !intro.step(frame, &mut camera) {
        assert!(!camera.is_attached());
        assert!(!camera.rotate(10.0, 0.0));
        elapsed += frame;
        assert!(elapsed < Duration::from_secs(7), "intro never finished");
    }
    // The last step may overshoot by up to one frame
    assert!(elapsed + frame >= Duration::from_secs(6));
    assert_eq!(camera.radius, 2.3);
    assert!(camera.is_attached());
    assert!(camera.rotate(10.0, 0.0));

    // The wheel cannot push past the radius limits
    for _ in 0..100 {
        camera.zoom(-400.0);
        camera.update();
    }
    assert_eq!(camera.radius, 5.0);
    assert!(camera.beta <= FRAC_PI_2 - 0.01);
}

#[test]
fn inspector_reports_the_wired_scene() {
    let Loaded { graph, camera, .. } = load();
    let light = setup_lights().unwrap();
    let text = inspector::report(&graph, &camera, &light);

    assert!(text.contains("Screen"));
    assert!(text.contains("mesh[screen]"));
    assert!(text.contains("Plant"));
    assert!(text.contains("camera camera1"));
    assert!(text.contains("light spotLight"));
}

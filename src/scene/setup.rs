//! Wiring applied to a freshly loaded model.
//!
//! The stages run in a fixed order and each one consumes the output of the
//! previous one, so they cannot be reordered or skipped:
//!
//! 1. [`classify_nodes`] freezes every loaded mesh except the screen
//! 2. [`wire_screen`] gives the screen its video material and points the camera at it
//! 3. [`wire_shelf`] freezes everything on the shelf
//! 4. [`signal_ready`] hides the loading indicator
//!
//! Missing `Screen` or `Shelf` nodes are not errors, the stage does nothing.

use crate::{
    camera::ArcRotateCamera,
    data_structures::{
        material::{BLACK, MaterialId, StandardMaterial, TextureId, TextureInfo, TextureSource, WHITE},
        scene_graph::{NodeId, ReadyAction, SceneGraph},
    },
    loading::LoadingUi,
    resources::video::{VideoTextureDesc, VideoTextureSettings},
    scene::Stage,
};

pub const SCREEN: &str = "Screen";
pub const SHELF: &str = "Shelf";
pub const SCREEN_MATERIAL: &str = "screen";
pub const VIDEO_TEXTURE: &str = "video";

/// Output of [`classify_nodes`].
#[derive(Clone, Debug, PartialEq)]
pub struct Classified {
    /// Every node the model added to the graph.
    pub nodes: Vec<NodeId>,
    pub frozen: Vec<NodeId>,
}

/// The wired up screen.
#[derive(Clone, Debug, PartialEq)]
pub struct Screen {
    pub node: NodeId,
    pub material: MaterialId,
    pub texture: TextureId,
    pub video: VideoTextureDesc,
}

/// Output of [`wire_screen`].
#[derive(Clone, Debug, PartialEq)]
pub struct ScreenWired {
    pub classified: Classified,
    pub screen: Option<Screen>,
}

/// Output of [`wire_shelf`].
#[derive(Clone, Debug, PartialEq)]
pub struct ShelfWired {
    pub wired: ScreenWired,
    pub shelf: Option<NodeId>,
    pub shelf_meshes: Vec<NodeId>,
}

/// A loaded and fully wired model.
#[derive(Clone, Debug, PartialEq)]
pub struct TvModel {
    pub nodes: Vec<NodeId>,
    pub frozen: Vec<NodeId>,
    pub screen: Option<Screen>,
    pub shelf: Option<NodeId>,
}

/// Make a node static: not pickable, bounding box no longer synced, world matrix frozen.
pub fn freeze(graph: &mut SceneGraph, id: NodeId) {
    let Some(node) = graph.node_mut(id) else {
        log::warn!("cannot freeze unknown node {id}");
        return;
    };
    node.set_pickable(false);
    node.set_sync_bounding_info(false);
    graph.freeze_world_matrix(id);
}

/// Freeze every mesh of the model, and the model's root, unless it is called `Screen`.
pub fn classify_nodes(graph: &mut SceneGraph, nodes: Vec<NodeId>) -> Classified {
    let frozen: Vec<NodeId> = nodes
        .iter()
        .copied()
        .filter(|&id| {
            graph
                .node(id)
                .is_some_and(|n| n.name() != SCREEN && (n.is_mesh() || n.parent().is_none()))
        })
        .collect();
    for &id in &frozen {
        freeze(graph, id);
    }
    log::info!("froze {} of {} loaded nodes", frozen.len(), nodes.len());
    Classified { nodes, frozen }
}

/// Description of the looping, muted video shown on the screen.
pub fn screen_video(source: &str) -> VideoTextureDesc {
    VideoTextureDesc {
        name: VIDEO_TEXTURE.to_string(),
        sources: vec![source.to_string()],
        invert_y: true,
        settings: VideoTextureSettings {
            muted: true,
            autoplay: true,
            looping: true,
        },
    }
}

/// Put the video on the `Screen` mesh and look at it.
pub fn wire_screen(
    graph: &mut SceneGraph,
    classified: Classified,
    camera: &mut Stage<ArcRotateCamera>,
    video_source: &str,
) -> ScreenWired {
    let Some(node) = graph.get_mesh_by_name(SCREEN) else {
        log::debug!("no {SCREEN} mesh, skipping the video material");
        return ScreenWired {
            classified,
            screen: None,
        };
    };

    let target = graph.node(node).map(|n| n.world_position());
    let video = screen_video(video_source);
    let texture = graph.add_texture(TextureInfo::new(
        VIDEO_TEXTURE,
        TextureSource::Video(video.clone()),
    ));
    // The same texture is used for diffuse and emissive, so these apply to both slots.
    if let Some(info) = graph.texture_mut(texture) {
        info.has_alpha = true;
        info.get_alpha_from_rgb = true;
    }
    let video_has_alpha = graph.texture(texture).is_some_and(|t| t.has_alpha);

    let mut material = StandardMaterial::new(SCREEN_MATERIAL);
    material.diffuse_texture = Some(texture);
    material.emissive_colour = if video_has_alpha { WHITE } else { BLACK };
    material.emissive_texture = Some(texture);
    material.use_alpha_from_diffuse_texture = true;
    let material = graph.add_material(material);

    if let Some(screen) = graph.node_mut(node) {
        screen.set_material(material);
        screen.set_on_ready(ReadyAction::PlayVideo(texture));
    }
    if let (Stage::Ready(camera), Some(target)) = (camera, target) {
        camera.set_target(target);
    }
    log::info!("screen wired to {video_source}");

    ScreenWired {
        classified,
        screen: Some(Screen {
            node,
            material,
            texture,
            video,
        }),
    }
}

/// Freeze every mesh below the `Shelf` node.
pub fn wire_shelf(graph: &mut SceneGraph, wired: ScreenWired) -> ShelfWired {
    let Some(shelf) = graph.get_node_by_name(SHELF) else {
        log::debug!("no {SHELF} node, nothing to freeze");
        return ShelfWired {
            wired,
            shelf: None,
            shelf_meshes: Vec::new(),
        };
    };
    let shelf_meshes = graph.child_meshes(shelf);
    for &id in &shelf_meshes {
        freeze(graph, id);
    }
    log::info!("froze {} meshes on the shelf", shelf_meshes.len());
    ShelfWired {
        wired,
        shelf: Some(shelf),
        shelf_meshes,
    }
}

/// Hide the loading indicator and hand out the finished model.
pub fn signal_ready(shelf: ShelfWired, loading: &mut LoadingUi) -> TvModel {
    loading.hide();
    let ShelfWired {
        wired: ScreenWired { classified, screen },
        shelf,
        shelf_meshes,
    } = shelf;
    let mut frozen = classified.frozen;
    for id in shelf_meshes {
        if !frozen.contains(&id) {
            frozen.push(id);
        }
    }
    TvModel {
        nodes: classified.nodes,
        frozen,
        screen,
        shelf,
    }
}

/// All stages in order.
pub fn wire_model(
    graph: &mut SceneGraph,
    nodes: Vec<NodeId>,
    camera: &mut Stage<ArcRotateCamera>,
    video_source: &str,
    loading: &mut LoadingUi,
) -> TvModel {
    let classified = classify_nodes(graph, nodes);
    let wired = wire_screen(graph, classified, camera, video_source);
    let shelf = wire_shelf(graph, wired);
    signal_ready(shelf, loading)
}

/// Wire a finished model load into the scene.
///
/// `append` moves the loaded model into `graph` and returns the new nodes. A
/// failed load is logged and leaves everything as it was, so the loading
/// indicator stays up. Only the first successful load is wired, later ones
/// are dropped before `append` runs. Returns whether the model was wired.
pub fn accept_model<M>(
    result: anyhow::Result<M>,
    model: &mut Stage<TvModel>,
    graph: &mut SceneGraph,
    camera: &mut Stage<ArcRotateCamera>,
    video_source: &str,
    loading: &mut LoadingUi,
    append: impl FnOnce(M, &mut SceneGraph) -> Vec<NodeId>,
) -> bool {
    let loaded = match result {
        Ok(loaded) => loaded,
        Err(e) => {
            log::error!("cannot load the model: {e:#}");
            return false;
        }
    };
    if model.is_ready() {
        log::warn!("a model is already loaded, ignoring the new one");
        return false;
    }

    let nodes = append(loaded, graph);
    *model = Stage::Ready(wire_model(graph, nodes, camera, video_source, loading));
    true
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use super::*;
    use crate::{
        data_structures::{instance::Instance, scene_graph::Aabb},
        loading::{LoadingState, tests::Recorder},
    };

    fn at(x: f32, y: f32, z: f32) -> Instance {
        Instance::from(cgmath::Vector3::new(x, y, z))
    }

    /// __root__ -> Cabinet (mesh) -> Screen (mesh), Shelf -> Book (mesh) -> Bookmark (mesh)
    fn tv(with_screen: bool) -> (SceneGraph, Vec<NodeId>) {
        let bounds = Aabb::from_points([[0.0; 3], [1.0; 3]]);
        let mut graph = SceneGraph::new();
        let root = graph.add_node("__root__", None, Instance::default());
        let cabinet = graph.add_node("Cabinet", Some(root), Instance::default());
        graph.add_primitive(cabinet, 0, None, bounds);
        if with_screen {
            let screen = graph.add_node(SCREEN, Some(cabinet), at(0.0, 1.0, 0.5));
            graph.add_primitive(screen, 1, None, bounds);
        }
        let shelf = graph.add_node(SHELF, Some(root), at(2.0, 0.0, 0.0));
        let book = graph.add_node("Book", Some(shelf), Instance::default());
        graph.add_primitive(book, 2, None, bounds);
        let bookmark = graph.add_node("Bookmark", Some(book), Instance::default());
        graph.add_primitive(bookmark, 3, None, bounds);
        graph.update_world_matrices();
        let nodes = (0..graph.len()).collect();
        (graph, nodes)
    }

    fn camera() -> Stage<ArcRotateCamera> {
        Stage::Ready(ArcRotateCamera::new(
            "camera1",
            FRAC_PI_2,
            1.0,
            5.0,
            cgmath::Point3::new(0.0, 0.0, 0.0),
        ))
    }

    #[test]
    fn everything_but_the_screen_is_frozen() {
        let (mut graph, nodes) = tv(true);
        let classified = classify_nodes(&mut graph, nodes);
        let screen = graph.get_node_by_name(SCREEN).unwrap();
        let shelf = graph.get_node_by_name(SHELF).unwrap();

        assert!(!classified.frozen.contains(&screen));
        // Transform-only nodes other than the root are left alone
        assert!(!classified.frozen.contains(&shelf));
        assert_eq!(classified.frozen.len(), 4);
        for &id in &classified.frozen {
            let flags = graph.node(id).unwrap().flags();
            assert!(!flags.pickable && !flags.sync_bounding_info && flags.world_matrix_frozen);
        }
        let flags = graph.node(screen).unwrap().flags();
        assert!(flags.pickable && flags.sync_bounding_info && !flags.world_matrix_frozen);
    }

    #[test]
    fn screen_gets_a_video_material_and_the_camera_looks_at_it() {
        let (mut graph, nodes) = tv(true);
        let mut camera = camera();
        let classified = classify_nodes(&mut graph, nodes);
        let wired = wire_screen(&mut graph, classified, &mut camera, "videoplayback.mp4");
        let screen = wired.screen.unwrap();

        let node = graph.node(screen.node).unwrap();
        assert_eq!(node.primitives()[0].material, Some(screen.material));

        let material = graph.material(screen.material).unwrap();
        assert_eq!(material.name, SCREEN_MATERIAL);
        assert_eq!(material.diffuse_texture, Some(screen.texture));
        assert_eq!(material.emissive_texture, Some(screen.texture));
        assert_eq!(material.emissive_colour, WHITE);
        assert!(material.use_alpha_from_diffuse_texture);

        let texture = graph.texture(screen.texture).unwrap();
        assert!(texture.has_alpha && texture.get_alpha_from_rgb && texture.is_video());
        assert_eq!(screen.video.sources, vec!["videoplayback.mp4".to_string()]);
        assert!(screen.video.settings.muted && screen.video.settings.looping);

        let Stage::Ready(camera) = camera else { panic!("camera is ready") };
        assert_eq!(camera.target(), cgmath::Point3::new(0.0, 1.0, 0.5));
        assert_eq!(
            graph.take_ready_action(screen.node),
            Some(ReadyAction::PlayVideo(screen.texture))
        );
    }

    #[test]
    fn missing_screen_changes_nothing() {
        let (mut graph, nodes) = tv(false);
        let mut camera = camera();
        let classified = classify_nodes(&mut graph, nodes);
        let wired = wire_screen(&mut graph, classified, &mut camera, "videoplayback.mp4");
        assert!(wired.screen.is_none());
        assert!(graph.materials().is_empty());
        assert!(graph.textures().is_empty());
        let Stage::Ready(camera) = camera else { panic!("camera is ready") };
        assert_eq!(camera.target(), cgmath::Point3::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn shelf_meshes_are_frozen_at_any_depth() {
        let (mut graph, nodes) = tv(true);
        let shelf = graph.get_node_by_name(SHELF).unwrap();
        let book = graph.get_node_by_name("Book").unwrap();
        let bookmark = graph.get_node_by_name("Bookmark").unwrap();
        let wired = ScreenWired {
            classified: Classified {
                nodes,
                frozen: Vec::new(),
            },
            screen: None,
        };
        let shelved = wire_shelf(&mut graph, wired);
        assert_eq!(shelved.shelf, Some(shelf));
        assert_eq!(shelved.shelf_meshes, vec![book, bookmark]);
        assert!(graph.node(bookmark).unwrap().flags().world_matrix_frozen);
        assert!(!graph.node(shelf).unwrap().flags().world_matrix_frozen);
    }

    #[test]
    fn wiring_hides_the_loading_indicator() {
        let (mut graph, nodes) = tv(true);
        let mut camera = camera();
        let recorder = Recorder::default();
        let mut loading = LoadingUi::new(Box::new(recorder.clone()));
        loading.display();

        let model = wire_model(&mut graph, nodes, &mut camera, "videoplayback.gif", &mut loading);
        assert_eq!(loading.state(), LoadingState::Hidden);
        assert_eq!(*recorder.0.borrow(), vec!["display", "hide"]);
        assert!(model.screen.is_some());
        assert_eq!(model.shelf, graph.get_node_by_name(SHELF));
        // Shelf meshes were already frozen by the first stage
        assert_eq!(model.frozen.len(), 4);
    }

    fn append_graph(loaded: SceneGraph, graph: &mut SceneGraph) -> Vec<NodeId> {
        graph.append(loaded)
    }

    #[test]
    fn failed_load_keeps_the_loading_indicator() {
        let mut model = Stage::Uninitialized;
        let mut graph = SceneGraph::new();
        let mut camera = camera();
        let recorder = Recorder::default();
        let mut loading = LoadingUi::new(Box::new(recorder.clone()));
        loading.display();

        let wired = accept_model(
            Err(anyhow::anyhow!("404 scene.glb")),
            &mut model,
            &mut graph,
            &mut camera,
            "videoplayback.gif",
            &mut loading,
            append_graph,
        );
        assert!(!wired);
        assert!(!model.is_ready());
        assert!(graph.is_empty());
        assert_eq!(loading.state(), LoadingState::Shown);
        assert_eq!(*recorder.0.borrow(), vec!["display"]);
    }

    #[test]
    fn only_the_first_model_is_wired() {
        let mut model = Stage::Uninitialized;
        let mut graph = SceneGraph::new();
        let mut camera = camera();
        let mut loading = LoadingUi::new(Box::new(Recorder::default()));
        loading.display();

        let (first, _) = tv(true);
        let wired = accept_model(
            Ok(first),
            &mut model,
            &mut graph,
            &mut camera,
            "videoplayback.gif",
            &mut loading,
            append_graph,
        );
        assert!(wired);
        assert_eq!(loading.state(), LoadingState::Hidden);
        let Stage::Ready(tv_model) = model.as_ref() else { panic!("model is wired") };
        assert!(tv_model.screen.is_some());
        let len = graph.len();

        let (second, _) = tv(true);
        let wired = accept_model(
            Ok(second),
            &mut model,
            &mut graph,
            &mut camera,
            "videoplayback.gif",
            &mut loading,
            |_, _| panic!("a second model must not be appended"),
        );
        assert!(!wired);
        assert_eq!(graph.len(), len);
    }
}

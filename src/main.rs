use tv_scene::SceneConfig;

fn main() {
    if let Err(e) = tv_scene::app::run(SceneConfig::default()) {
        log::error!("{e:#}");
        std::process::exit(1);
    }
}

use rocket::fs::FileServer;
use rocket::http::ContentType;
use rocket::{Build, Rocket};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::*;

pub const ASSETS_ROOT: &str = "/assets";

#[derive(rocket::Responder)]
pub struct StaticFile {
	pub data: Cow<'static, [u8]>,
	pub content_type: ContentType,
}

#[derive(rust_embed::RustEmbed)]
#[folder = "assets/"]
pub struct StaticAssets;

pub struct Assets;

impl Assets {
	pub fn get(file_path: &str) -> Option<StaticFile> {
		let data = StaticAssets::get(file_path)?;
		let content_type =
			if let Some(extension) = Path::new(file_path).extension().and_then(|e| e.to_str()) {
				ContentType::from_extension(extension).unwrap_or(ContentType::Binary)
			} else {
				ContentType::Binary
			};
		Some(StaticFile { data, content_type })
	}
}

#[rocket::get("/<path..>")]
fn embedded_asset(path: PathBuf) -> Option<StaticFile> {
	// Embedded names are utf-8 with `/` separators
	let path = path.to_str()?.replace('\\', "/");
	Assets::get(&path)
}

/// Development serves `assets_dir` straight off the disk so rebuilt assets show up on reload,
/// production serves the copy embedded at build time.
pub fn mount_assets(rocket: Rocket<Build>, development: bool, assets_dir: &Path) -> Rocket<Build> {
	if !development {
		return rocket.mount(ASSETS_ROOT, rocket::routes![embedded_asset]);
	}
	if assets_dir.is_dir() {
		info!("Serving assets live from {:?}", assets_dir);
		rocket.mount(ASSETS_ROOT, FileServer::from(assets_dir))
	} else {
		warn!(
			"Assets directory {:?} does not exist, falling back to the embedded assets",
			assets_dir
		);
		rocket.mount(ASSETS_ROOT, rocket::routes![embedded_asset])
	}
}

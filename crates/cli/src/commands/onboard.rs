//! `montage onboard`: First-time setup.

use montage_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("🎨 montage: First-Time Setup");
    println!("=============================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("✅ Created config.toml at: {}", config_path.display());
    }

    let config = AppConfig::load_from(&config_path)?;
    if !config.cache.dir.exists() {
        std::fs::create_dir_all(&config.cache.dir)?;
        println!("✅ Created preview cache: {}", config.cache.dir.display());
    }

    println!("\n📝 Next steps:");
    println!("   1. Set MONTAGE_API_KEY (or ANTHROPIC_API_KEY) for LLM planning and curation");
    println!("      Without a key, montage runs offline with keyword search and first-N curation");
    println!("   2. Run: montage run \"vintage botanical illustrations\"\n");

    Ok(())
}

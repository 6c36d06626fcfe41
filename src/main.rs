use anyhow::{Context, Result};
use lesson_pipeline::{logger, App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置（环境变量 > PIPELINE_CONFIG 指定的 TOML > 默认值）
    let config = Config::load().context("配置加载失败")?;

    // 初始化日志
    logger::init(config.verbose_logging);

    let app = App::initialize(config).await?;
    app.run().await
}

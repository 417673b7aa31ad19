// scoped-container 演示程序
//
// 注册一组示例服务，启动容器，按三种作用域解析，然后关闭。

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use scoped_container::config::ConfigLoader;
use scoped_container::logging::{init_logging, LoggingConfig};
use scoped_container::{
    predicate, BoxError, Container, ContainerContext, Lifecycle, ServiceInstance, REQUEST_ID_KEY,
};

#[derive(Parser)]
#[command(name = "scoped-container")]
#[command(about = "作用域依赖注入容器演示")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// 配置文件路径
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// 注册示例服务并执行一次完整的生命周期
    Demo {
        /// 缓存后端（memory 或 noop），由条件绑定选择
        #[arg(long, default_value = "memory")]
        cache: String,

        /// 瞬态服务解析次数
        #[arg(long, default_value_t = 3)]
        iterations: usize,

        /// 关闭时一并清除单例
        #[arg(long)]
        clear: bool,
    },
    /// 打印合并后的配置
    Config,
}

trait Database: Lifecycle {
    fn query(&self, sql: &str) -> String;
}

trait Cache: Lifecycle {
    fn backend(&self) -> &'static str;
}

trait RequestLogger: Lifecycle {
    fn log(&self, message: &str);
}

#[derive(Default)]
struct InMemoryDatabase {
    connected: AtomicBool,
}

impl Lifecycle for InMemoryDatabase {
    fn on_boot(&self, _ctx: &ContainerContext) -> Result<(), BoxError> {
        self.connected.store(true, Ordering::SeqCst);
        println!("  [db] connected");
        Ok(())
    }

    fn on_shutdown(&self, _ctx: &ContainerContext) -> Result<(), BoxError> {
        self.connected.store(false, Ordering::SeqCst);
        println!("  [db] disconnected");
        Ok(())
    }
}

impl Database for InMemoryDatabase {
    fn query(&self, sql: &str) -> String {
        if self.connected.load(Ordering::SeqCst) {
            format!("ok: {}", sql)
        } else {
            "error: not connected".to_string()
        }
    }
}

struct NamedCache {
    backend: &'static str,
}

impl Lifecycle for NamedCache {
    fn on_boot(&self, ctx: &ContainerContext) -> Result<(), BoxError> {
        // 缓存依赖数据库：通过钩子上下文中的容器解析
        let container = ctx.container().ok_or("container handle unavailable")?;
        let db = container.resolve_singleton::<dyn Database>()?;
        let request_id = ctx
            .get::<String>(REQUEST_ID_KEY)
            .map(|id| id.as_str().to_owned())
            .unwrap_or_default();
        println!("  [cache:{}] warmed for {} ({})", self.backend, request_id, db.query("SELECT 1"));
        Ok(())
    }

    fn on_shutdown(&self, _ctx: &ContainerContext) -> Result<(), BoxError> {
        println!("  [cache:{}] flushed", self.backend);
        Ok(())
    }
}

impl Cache for NamedCache {
    fn backend(&self) -> &'static str {
        self.backend
    }
}

#[derive(Default)]
struct StdoutLogger {
    cycles: AtomicUsize,
}

impl Lifecycle for StdoutLogger {
    fn on_boot(&self, _ctx: &ContainerContext) -> Result<(), BoxError> {
        let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        println!("  [logger] cycle {} started", cycle);
        Ok(())
    }

    fn on_shutdown(&self, _ctx: &ContainerContext) -> Result<(), BoxError> {
        println!("  [logger] cycle {} finished", self.cycles.load(Ordering::SeqCst));
        Ok(())
    }
}

impl RequestLogger for StdoutLogger {
    fn log(&self, message: &str) {
        println!("  [logger] {}", message);
    }
}

fn run_demo(container: &Container, cache: &str, iterations: usize, clear: bool) -> anyhow::Result<()> {
    let request_id = uuid::Uuid::new_v4().to_string();
    println!("🚀 request {}", request_id);

    let db: Arc<dyn Database> = Arc::new(InMemoryDatabase::default());
    container.bind_singleton(Some(db), None)?;

    let memory: Arc<dyn Cache> = Arc::new(NamedCache { backend: "memory" });
    let noop: Arc<dyn Cache> = Arc::new(NamedCache { backend: "noop" });
    let fallback = memory.clone();
    let cache_ctx = ContainerContext::background()
        .with_value(REQUEST_ID_KEY, request_id.clone())
        .with_value("cache_backend", cache.to_string());
    let choose_cache = predicate(move |ctx: &ContainerContext| {
        let wanted = ctx.get::<String>("cache_backend");
        let selected = match wanted.as_deref().map(String::as_str) {
            Some("noop") => noop.clone(),
            Some("memory") | None => memory.clone(),
            Some(other) => return Err(format!("unknown cache backend: {}", other).into()),
        };
        Ok(ServiceInstance::new(selected))
    });
    container.bind_request(Some(fallback), Some(cache_ctx), Some(choose_cache))?;

    let logger: Arc<dyn RequestLogger> = Arc::new(StdoutLogger::default());
    container.bind_transient(Some(logger), None, None)?;

    println!("📦 booting {} bindings", container.binding_count());
    container.boot().context("container boot failed")?;

    let db = container.resolve_singleton::<dyn Database>()?;
    println!("🔎 {}", db.query("SELECT * FROM users"));

    let cache = container.resolve_request::<dyn Cache>()?;
    println!("🗄️  cache backend: {}", cache.backend());

    for i in 0..iterations {
        let logger = container.resolve_transient::<dyn RequestLogger>()?;
        logger.log(&format!("iteration {}", i + 1));
    }

    println!("🛑 shutting down (clear singletons: {})", clear);
    container.shutdown(clear).context("container shutdown failed")?;

    println!("📊 {}", container.stats().summary());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loader = ConfigLoader::new();
    let config = match &cli.config {
        Some(path) => loader.load_from(path),
        None => loader.load_config(),
    }
    .context("failed to load configuration")?;

    init_logging(LoggingConfig::from_container_config(&config)?)?;

    match cli.command.unwrap_or(Commands::Demo {
        cache: "memory".to_string(),
        iterations: 3,
        clear: false,
    }) {
        Commands::Demo {
            cache,
            iterations,
            clear,
        } => {
            let container = Container::with_config(&config);
            run_demo(&container, &cache, iterations, clear)?;
        }
        Commands::Config => {
            println!("initial_capacity      = {}", config.initial_capacity);
            println!("tracker_pool_capacity = {}", config.tracker_pool_capacity);
            println!("log_level             = {}", config.log_level);
            println!("log_format            = {}", config.log_format);
            for (key, value) in &config.base_values {
                println!("base_values.{} = {}", key, value);
            }
        }
    }

    Ok(())
}

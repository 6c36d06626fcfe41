//! 批量文档处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是命令行程序的入口，负责批量文档的处理和资源管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：写日志文件头、创建存储/监控/传输层、组装 `Pipeline`
//! 2. **批量加载**：扫描文档目录（`Vec<Document>`）
//! 3. **并发控制**：使用 Semaphore 限制同时处理的文档数
//! 4. **分批处理**：每批完成后再开始下一批
//! 5. **全局刷新**：把本次生成的课时归入课程；开启 `refresh_after_batch` 时按课程重新评估并生成课程结构
//! 6. **全局统计**：汇总成功/失败、平均延迟和告警次数

use crate::config::Config;
use crate::infrastructure::InMemoryLessonStore;
use crate::models::{Document, LessonId, ProgressEvent, ProgressLevel};
use crate::orchestrator::pipeline::Pipeline;
use crate::services::monitoring::{self, AiMonitor};
use crate::services::ProgressWriter;
use crate::utils::logging::{
    init_log_file, log_batch_complete, log_batch_start, log_documents_loaded, log_startup,
    print_final_stats,
};
use crate::workflow::{LessonCtx, ProgressReporter};
use anyhow::{Context, Result};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// 命令行模式下的本地用户
const LOCAL_USER: &str = "local-user";

/// 应用主结构
pub struct App {
    config: Config,
    pipeline: Pipeline,
    store: Arc<InMemoryLessonStore>,
    writer: ProgressWriter,
    _cleanup: JoinHandle<()>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        // 初始化日志文件
        init_log_file(&config.output_log_file)?;

        log_startup(&config);

        let store = Arc::new(InMemoryLessonStore::with_user(LOCAL_USER));
        let monitor = Arc::new(AiMonitor::new(config.monitoring.clone()));
        let cleanup = monitor.spawn_cleanup();

        let pipeline = Pipeline::from_config(config.clone(), store.clone(), monitor)
            .context("无法创建模型传输层")?;

        Ok(Self {
            writer: ProgressWriter::with_path(config.output_log_file.clone()),
            config,
            pipeline,
            store,
            _cleanup: cleanup,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<()> {
        let all_documents = self.load_documents().await?;

        if all_documents.is_empty() {
            warn!("⚠️ 没有找到待处理的文档，程序结束");
            return Ok(());
        }

        let total = all_documents.len();
        log_documents_loaded(total, self.config.max_concurrent_documents);

        // 处理所有文档
        let (stats, lesson_ids) = self.process_all_documents(all_documents).await?;

        // 归入课程；全局刷新会重新评估刚处理过的课时，需显式开启
        if !lesson_ids.is_empty() {
            self.assign_course(&lesson_ids)?;
            if self.config.refresh_after_batch {
                self.run_global_refresh().await?;
            }
        }

        print_final_stats(
            stats.success,
            stats.failed,
            stats.total,
            &self.config.output_log_file,
        );
        monitoring::log_summary(self.pipeline.monitor(), self.pipeline.provider_name());

        Ok(())
    }

    /// 加载文档
    async fn load_documents(&self) -> Result<Vec<Document>> {
        info!("\n📁 正在扫描待处理的文档...");
        let documents = crate::models::load_all_documents(&self.config.documents_folder)
            .await
            .context("文档加载失败")?;
        Ok(documents)
    }

    /// 处理所有文档
    async fn process_all_documents(
        &self,
        all_documents: Vec<Document>,
    ) -> Result<(ProcessingStats, Vec<LessonId>)> {
        let batch_size = self.config.max_concurrent_documents;
        let semaphore = Arc::new(Semaphore::new(batch_size));
        let total = all_documents.len();
        let mut stats = ProcessingStats {
            total,
            ..Default::default()
        };
        let mut lesson_ids = Vec::new();

        // 进度事件统一由一个任务写入日志文件
        let (reporter, mut events) = self.pipeline.reporter();
        let writer = self.writer.clone();
        let writer_task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let Err(e) = writer.write(&event).await {
                    warn!("写入进度日志失败: {}", e);
                }
            }
        });

        // 分批处理
        let total_batches = total.div_ceil(batch_size);
        for batch_start in (0..total).step_by(batch_size) {
            let batch_end = (batch_start + batch_size).min(total);
            let batch_num = (batch_start / batch_size) + 1;

            log_batch_start(batch_num, total_batches, batch_start + 1, batch_end, total);

            let batch_result = self
                .process_batch(
                    &all_documents[batch_start..batch_end],
                    batch_start,
                    semaphore.clone(),
                    &reporter,
                )
                .await?;

            let batch_success = batch_result.lesson_ids.len();
            stats.success += batch_success;
            stats.failed += batch_result.failed;
            lesson_ids.extend(batch_result.lesson_ids);

            log_batch_complete(batch_num, batch_success, batch_end - batch_start);
        }

        drop(reporter);
        writer_task.await.context("进度写入任务异常退出")?;

        Ok((stats, lesson_ids))
    }

    /// 处理单个批次
    async fn process_batch(
        &self,
        batch_documents: &[Document],
        batch_start: usize,
        semaphore: Arc<Semaphore>,
        reporter: &ProgressReporter,
    ) -> Result<BatchResult> {
        let mut batch_handles = Vec::new();

        // 为本批创建并发任务
        for (idx, document) in batch_documents.iter().enumerate() {
            let ctx = LessonCtx::for_document(batch_start + idx + 1, document);
            let permit = semaphore.clone().acquire_owned().await?;

            let pipeline = self.pipeline.clone();
            let reporter = reporter.clone();
            let document = document.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                let result = pipeline.process_one_with(&document, &ctx, &reporter).await;
                if let Err(info) = &result {
                    error!("{} ❌ 处理失败: {}", ctx, info);
                }
                result
            });
            batch_handles.push((batch_start + idx + 1, handle));
        }

        // 等待本批所有任务完成
        let mut result = BatchResult::default();

        for (document_index, handle) in batch_handles {
            match handle.await {
                Ok(Ok(outcome)) => {
                    info!(
                        "[文档 {}] ✓ 完成，评分 {:.2}{}",
                        document_index,
                        outcome.quality_score,
                        if outcome.refined { "（已优化）" } else { "" }
                    );
                    result.lesson_ids.push(outcome.lesson_id);
                }
                Ok(Err(_)) => {
                    result.failed += 1;
                }
                Err(e) => {
                    error!("[文档 {}] 任务执行失败: {}", document_index, e);
                    result.failed += 1;
                }
            }
        }

        Ok(result)
    }

    /// 把本次生成的课时归入以文档目录命名的课程
    fn assign_course(&self, lesson_ids: &[LessonId]) -> Result<()> {
        let course_id = self.store.create_course(self.config.documents_folder.clone())?;
        for lesson_id in lesson_ids {
            self.store.assign_course(lesson_id, &course_id)?;
        }
        info!(
            "📚 已将 {} 个课时归入课程: {}",
            lesson_ids.len(),
            self.config.documents_folder
        );
        Ok(())
    }

    /// 全局刷新，进度写入日志文件
    async fn run_global_refresh(&self) -> Result<()> {
        info!("\n🔄 开始全局刷新...");
        let mut events = Box::pin(self.pipeline.process_all());
        let mut errors = 0usize;

        while let Some(event) = events.next().await {
            if event.level == ProgressLevel::Error {
                errors += 1;
            }
            self.write_event(&event).await;
        }

        info!("🔄 全局刷新结束，错误 {} 个", errors);
        Ok(())
    }

    async fn write_event(&self, event: &ProgressEvent) {
        if let Err(e) = self.writer.write(event).await {
            warn!("写入进度日志失败: {}", e);
        }
    }
}

/// 处理统计
#[derive(Debug, Default)]
struct ProcessingStats {
    success: usize,
    failed: usize,
    total: usize,
}

/// 批次处理结果
#[derive(Debug, Default)]
struct BatchResult {
    lesson_ids: Vec<LessonId>,
    failed: usize,
}

use crate::error::{AppError, AppResult, FileError};
use crate::models::document::Document;
use std::path::{Path, PathBuf};
use tokio::fs;

/// 支持的文档扩展名
const DOCUMENT_EXTENSIONS: &[&str] = &["txt", "md", "markdown"];

/// 从文件加载一份文档
pub async fn load_document(file_path: &Path) -> AppResult<Document> {
    let content = fs::read_to_string(file_path)
        .await
        .map_err(|e| AppError::file_read_failed(file_path.display().to_string(), e))?;

    let name = file_path
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();

    let mut document = Document::new(name, content);
    document.file_path = Some(file_path.to_string_lossy().to_string());

    Ok(document)
}

/// 从文件夹中加载所有文档（按文件名排序）
///
/// 单个文件加载失败只记录警告，不影响其他文件
pub async fn load_all_documents(folder_path: &str) -> AppResult<Vec<Document>> {
    let folder = PathBuf::from(folder_path);

    if !folder.is_dir() {
        return Err(FileError::DirectoryNotFound {
            path: folder_path.to_string(),
        }
        .into());
    }

    let mut paths = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .map_err(|e| AppError::file_read_failed(folder_path, e))?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| AppError::file_read_failed(folder_path, e))?
    {
        let path = entry.path();
        if is_document(&path) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        tracing::info!(
            "正在加载: {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        );

        match load_document(&path).await {
            Ok(document) => {
                tracing::info!("成功加载 {} 字节", document.size_bytes);
                documents.push(document);
            }
            Err(e) => {
                tracing::warn!("加载文件失败 {}: {}", path.display(), e);
            }
        }
    }

    Ok(documents)
}

fn is_document(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| DOCUMENT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_all_documents_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.md"), "# Second").unwrap();
        std::fs::write(dir.path().join("a.txt"), "First").unwrap();
        std::fs::write(dir.path().join("skip.pdf"), "binary").unwrap();

        let docs = load_all_documents(dir.path().to_str().unwrap()).await.unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].name, "a.txt");
        assert_eq!(docs[0].content, "First");
        assert_eq!(docs[1].title(), "b");
        assert!(docs[1].file_path.as_deref().unwrap().ends_with("b.md"));
    }

    #[tokio::test]
    async fn test_missing_folder() {
        let err = load_all_documents("/definitely/not/here").await.unwrap_err();
        assert!(matches!(
            err,
            AppError::File(FileError::DirectoryNotFound { ref path }) if path == "/definitely/not/here"
        ));
    }
}

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use log::warn;

use crate::classify::DetectKind;

/// 永久存储中的文件角色
#[derive(Debug, Clone, Copy)]
pub enum FileRole {
    /// 原始上传图片
    Original,
    /// 标注了检测框的渲染图
    Detected,
}

impl FileRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Detected => "detected",
        }
    }
}

// 同一毫秒内的并发上传靠进程内序号区分
static STAGE_SEQ: AtomicU64 = AtomicU64::new(0);

/// 管理图片文件从临时区到永久区的生命周期
///
/// 目录结构为 `<root>/tmp` 和 `<root>/storage/{kind}/{original,detected}`
#[derive(Debug, Clone)]
pub struct StorageDir {
    root: PathBuf,
}

impl StorageDir {
    /// 打开存储目录，缺失的子目录自动建立
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let dir = Self { root: root.into() };
        fs::create_dir_all(dir.tmp_dir())
            .with_context(|| format!("创建临时目录失败: {}", dir.tmp_dir().display()))?;
        for kind in [DetectKind::Pothole, DetectKind::Waste] {
            for role in [FileRole::Original, FileRole::Detected] {
                fs::create_dir_all(dir.role_dir(kind, role))?;
            }
        }
        Ok(dir)
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    /// 永久存储根目录，HTTP 层从这里对外提供文件
    pub fn storage_dir(&self) -> PathBuf {
        self.root.join("storage")
    }

    pub fn role_dir(&self, kind: DetectKind, role: FileRole) -> PathBuf {
        self.storage_dir().join(kind.as_str()).join(role.as_str())
    }

    /// 把上传内容写入临时区
    ///
    /// 文件名为时间戳 + 进程内序号 + 净化后的原始文件名，
    /// 同名并发上传不会互相覆盖
    pub fn stage(&self, bytes: &[u8], declared_name: &str) -> Result<StagedFile> {
        let staged = self.reserve(declared_name);
        fs::write(&staged.path, bytes)
            .with_context(|| format!("写入临时文件失败: {}", staged.path.display()))?;
        Ok(staged)
    }

    /// 为派生产物（标注渲染图）预留一个唯一的临时路径，文件由调用者写入
    pub fn reserve(&self, declared_name: &str) -> StagedFile {
        let name = unique_name(declared_name);
        let path = self.tmp_dir().join(&name);
        StagedFile { path, name }
    }

    /// 删除记录对应的永久文件
    ///
    /// 文件系统和数据库可能漂移，文件缺失只告警，不阻塞记录删除
    pub fn reclaim(&self, kind: DetectKind, image_name: &str, detected_image_path: Option<&str>) {
        let mut paths = vec![self.role_dir(kind, FileRole::Original).join(image_name)];
        if let Some(detected) = detected_image_path {
            paths.push(self.role_dir(kind, FileRole::Detected).join(detected));
        }
        for path in paths {
            if let Err(e) = fs::remove_file(&path) {
                warn!("回收文件失败: {}: {e}", path.display());
            }
        }
    }
}

/// 临时文件的所有权凭证
///
/// 按值消费：要么 promote 进永久区，要么 discard 删除，二者只能发生一次
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    name: String,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 移入 `storage/{kind}/{role}/`，返回存储目录下的文件名
    ///
    /// 失败时临时文件原地保留，便于人工恢复
    pub fn promote(self, dir: &StorageDir, kind: DetectKind, role: FileRole) -> Result<String> {
        let dest = dir.role_dir(kind, role).join(&self.name);
        fs::rename(&self.path, &dest)
            .with_context(|| format!("移动 {} 到 {} 失败", self.path.display(), dest.display()))?;
        Ok(self.name)
    }

    /// 删除临时文件，用于未检出任何目标的请求
    pub fn discard(self) -> Result<()> {
        fs::remove_file(&self.path)
            .with_context(|| format!("删除临时文件失败: {}", self.path.display()))
    }
}

fn unique_name(declared: &str) -> String {
    // 只保留文件名部分，防止路径穿越
    let base = Path::new(declared)
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "upload".to_string());
    let millis = chrono::Utc::now().timestamp_millis();
    let seq = STAGE_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{millis}_{seq}_{base}")
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_stage_then_promote() {
        let root = tempdir().unwrap();
        let dir = StorageDir::create(root.path()).unwrap();

        let staged = dir.stage(b"jpeg bytes", "road.jpg").unwrap();
        assert!(staged.path().exists());
        assert!(staged.name().ends_with("_road.jpg"));

        let name = staged.promote(&dir, DetectKind::Pothole, FileRole::Original).unwrap();
        let dest = dir.role_dir(DetectKind::Pothole, FileRole::Original).join(&name);
        assert!(dest.exists());
        assert_eq!(fs::read(dest).unwrap(), b"jpeg bytes");
        // 临时区应当已经清空
        assert_eq!(fs::read_dir(dir.tmp_dir()).unwrap().count(), 0);
    }

    #[test]
    fn test_stage_then_discard() {
        let root = tempdir().unwrap();
        let dir = StorageDir::create(root.path()).unwrap();

        let staged = dir.stage(b"x", "road.jpg").unwrap();
        let path = staged.path().to_path_buf();
        staged.discard().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_same_name_never_collides() {
        let root = tempdir().unwrap();
        let dir = StorageDir::create(root.path()).unwrap();

        let a = dir.stage(b"a", "same.jpg").unwrap();
        let b = dir.stage(b"b", "same.jpg").unwrap();
        assert_ne!(a.name(), b.name());

        let a = a.promote(&dir, DetectKind::Waste, FileRole::Original).unwrap();
        let b = b.promote(&dir, DetectKind::Waste, FileRole::Original).unwrap();
        let role_dir = dir.role_dir(DetectKind::Waste, FileRole::Original);
        assert_eq!(fs::read(role_dir.join(a)).unwrap(), b"a");
        assert_eq!(fs::read(role_dir.join(b)).unwrap(), b"b");
    }

    #[test]
    fn test_declared_name_sanitized() {
        let root = tempdir().unwrap();
        let dir = StorageDir::create(root.path()).unwrap();

        let staged = dir.stage(b"x", "../../etc/passwd").unwrap();
        assert!(staged.path().starts_with(dir.tmp_dir()));
        assert!(staged.name().ends_with("_passwd"));
        staged.discard().unwrap();
    }

    #[test]
    fn test_reclaim_tolerates_missing() {
        let root = tempdir().unwrap();
        let dir = StorageDir::create(root.path()).unwrap();

        let staged = dir.stage(b"x", "a.jpg").unwrap();
        let name = staged.promote(&dir, DetectKind::Waste, FileRole::Original).unwrap();

        // detected 一侧并不存在，reclaim 不应当报错
        dir.reclaim(DetectKind::Waste, &name, Some("missing.jpg"));
        assert!(!dir.role_dir(DetectKind::Waste, FileRole::Original).join(&name).exists());

        // 再次回收同一条记录同样安静通过
        dir.reclaim(DetectKind::Waste, &name, None);
    }
}

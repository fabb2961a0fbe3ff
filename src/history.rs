// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 最近打开的视频 (每行一个路径, 最新的在最前)
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub struct RecentVideos {
    file: PathBuf,
    limit: usize,
    entries: Vec<String>,
}

impl RecentVideos {
    pub fn load(file: impl Into<PathBuf>, limit: usize) -> Self {
        let file = file.into();
        let mut recent = Self {
            file,
            limit: limit.max(1),
            entries: Vec::new(),
        };
        recent.reload();
        recent
    }

    /// 重新读取历史文件 (文件不存在时为空)
    fn reload(&mut self) {
        let Ok(content) = std::fs::read_to_string(&self.file) else {
            return;
        };
        let mut entries: Vec<String> = Vec::new();
        for line in content.lines().map(str::trim).filter(|s| !s.is_empty()) {
            if !entries.iter().any(|e| e == line) {
                entries.push(line.to_string());
            }
        }
        entries.truncate(self.limit);
        self.entries = entries;
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 移到最前面 (新路径直接插入) 并保存
    pub fn touch(&mut self, path: &Path) {
        let entry = path.display().to_string();
        if self.entries.first() == Some(&entry) {
            return;
        }
        self.entries.retain(|e| *e != entry);
        self.entries.insert(0, entry);
        self.entries.truncate(self.limit);
        debug!("📝 最近视频: {}", path.display());
        self.save();
    }

    fn save(&self) {
        if let Err(e) = std::fs::write(&self.file, self.entries.join("\n")) {
            warn!("⚠️ 保存历史记录失败: {}", e);
        }
    }
}

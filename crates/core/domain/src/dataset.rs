//! 设备已提交的表格数据集。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// CSV 解析得到的数据集：预览字段供前端展示，`data` 为完整行集。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvDataset {
    pub headers: Vec<String>,
    pub csv_preview: Vec<Vec<String>>,
    pub json_preview: Vec<Map<String, Value>>,
    #[serde(default)]
    pub data: Vec<Map<String, Value>>,
    #[serde(default)]
    pub total_rows: usize,
}

impl CsvDataset {
    /// 可传输的行数。
    pub fn row_count(&self) -> usize {
        self.data.len()
    }

    pub fn row(&self, index: usize) -> Option<&Map<String, Value>> {
        self.data.get(index)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_data_defaults_to_empty() {
        let dataset: CsvDataset = serde_json::from_value(serde_json::json!({
            "headers": ["a"],
            "csv_preview": [["1"]],
            "json_preview": [{"a": "1"}]
        }))
        .expect("dataset");
        assert!(dataset.is_empty());
        assert_eq!(dataset.total_rows, 0);
        assert_eq!(dataset.json_preview.len(), 1);
    }
}

// 本地文件连接器示例
// 读取 JSON 或 CSV 文件，统一以 JSON 字符串输出

use std::fs;
use std::path::PathBuf;

use data_fetch_abi::{ConfigField, Connector, ConnectorInfo, ConnectorPlugin as PluginTable, SessionConfig};
use serde_json::{Map, Value};

static INFO: ConnectorInfo = ConnectorInfo::new(
    c"com.example.file",
    c"本地文件",
    c"读取本地 JSON/CSV 文件",
);

static FIELDS: [ConfigField; 3] = [
    ConfigField::new(c"filePath", c"文件路径", c"text"),
    ConfigField::new(c"format", c"文件格式", c"select")
        .with_default(c"json")
        .with_options(c"[{\"label\":\"JSON\",\"value\":\"json\"},{\"label\":\"CSV\",\"value\":\"csv\"}]"),
    ConfigField::new(c"delimiter", c"CSV 分隔符", c"text").with_default(c","),
];

/// 插件导出的函数表
#[allow(non_upper_case_globals)]
#[unsafe(no_mangle)]
pub static ConnectorPlugin: PluginTable = PluginTable::of::<FileConnector>();

/// 文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    Json,
    Csv { delimiter: u8 },
}

/// 文件连接会话
#[derive(Debug)]
pub struct FileConnector {
    path: PathBuf,
    format: FileFormat,
}

impl FileConnector {
    fn read_json(&self, content: &str) -> Option<String> {
        let value: Value = serde_json::from_str(content).ok()?;
        serde_json::to_string(&value).ok()
    }

    fn read_csv(&self, content: &str, delimiter: u8) -> Option<String> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .from_reader(content.as_bytes());

        let headers = reader.headers().ok()?.clone();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.ok()?;
            let row: Map<String, Value> = headers
                .iter()
                .zip(record.iter())
                .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
                .collect();
            rows.push(Value::Object(row));
        }

        serde_json::to_string(&rows).ok()
    }
}

impl Connector for FileConnector {
    fn info() -> &'static ConnectorInfo {
        &INFO
    }

    fn config_fields() -> &'static [ConfigField] {
        &FIELDS
    }

    fn connect(config: SessionConfig) -> Option<Self> {
        let path = config.get("filePath").filter(|path| !path.is_empty())?;

        let format = match config.get("format").map(String::as_str).unwrap_or("json") {
            "json" => FileFormat::Json,
            "csv" => {
                let delimiter = config.get("delimiter").map(String::as_str).unwrap_or(",");
                match delimiter.as_bytes() {
                    [byte] => FileFormat::Csv { delimiter: *byte },
                    _ => return None,
                }
            }
            _ => return None,
        };

        Some(Self {
            path: PathBuf::from(path),
            format,
        })
    }

    fn test_connect(&mut self) -> bool {
        self.path.is_file()
    }

    fn fetch_data(&mut self) -> Option<String> {
        let content = fs::read_to_string(&self.path).ok()?;
        match self.format {
            FileFormat::Json => self.read_json(&content),
            FileFormat::Csv { delimiter } => self.read_csv(&content, delimiter),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(pairs: &[(&str, &str)]) -> SessionConfig {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn test_exported_table_is_complete() {
        assert_eq!(ConnectorPlugin.first_missing_entry(), None);
        assert_eq!(FileConnector::config_fields().len(), 3);
    }

    #[test]
    fn test_connect_requires_file_path() {
        assert!(FileConnector::connect(config(&[])).is_none());
        assert!(FileConnector::connect(config(&[("filePath", "")])).is_none());
        assert!(FileConnector::connect(config(&[("filePath", "a.json"), ("format", "xml")])).is_none());
        assert!(
            FileConnector::connect(config(&[("filePath", "a.csv"), ("format", "csv"), ("delimiter", ";;")]))
                .is_none()
        );
    }

    #[test]
    fn test_fetch_json_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.json");
        fs::write(&path, "{ \"rows\": [1, 2, 3] }").unwrap();

        let mut session =
            FileConnector::connect(config(&[("filePath", path.to_str().unwrap())])).unwrap();
        assert!(session.test_connect());
        assert_eq!(session.fetch_data().as_deref(), Some("{\"rows\":[1,2,3]}"));
    }

    #[test]
    fn test_fetch_csv_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.csv");
        fs::write(&path, "name;age\nalice;30\nbob;25\n").unwrap();

        let mut session = FileConnector::connect(config(&[
            ("filePath", path.to_str().unwrap()),
            ("format", "csv"),
            ("delimiter", ";"),
        ]))
        .unwrap();

        let payload: Value = serde_json::from_str(&session.fetch_data().unwrap()).unwrap();
        assert_eq!(payload[0]["name"], "alice");
        assert_eq!(payload[1]["age"], "25");
    }

    #[test]
    fn test_missing_file_fails_connect_and_fetch() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.json");

        let mut session =
            FileConnector::connect(config(&[("filePath", path.to_str().unwrap())])).unwrap();
        assert!(!session.test_connect());
        assert!(session.fetch_data().is_none());
    }
}

#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use agristat::config::{InputConfig, PipelineConfig};
use tempfile::{TempDir, tempdir};

/// Wide land-use table with year-range headers and a district column.
pub const LAND_WIDE: &str = "\
State,District,2018_2019__forests,2018_2019__net_area_sown,2019-2020__forests
Bihar,Patna,100,50,10
Goa,North Goa,20,,5
";

/// Crop table in the same shape as `LAND_WIDE`.
pub const CROP_WIDE: &str = "\
State,2018_2019__production_total,2019/2020__production_total
Bihar,30,4
Kerala,7,
";

/// Scratch directory that cleans up on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Configuration pointing at `land.csv`, `crop.csv` and `final.csv` in
    /// this workspace.
    pub fn config(&self, land: &str, crop: &str) -> PipelineConfig {
        PipelineConfig {
            land: InputConfig::at(self.write("land.csv", land)),
            crop: InputConfig::at(self.write("crop.csv", crop)),
            output: self.join("final.csv"),
            ..PipelineConfig::default()
        }
    }
}

/// Reads a CSV file into header plus rows.
pub fn read_csv(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::Reader::from_path(path).expect("open csv");
    let headers = reader
        .headers()
        .expect("headers")
        .iter()
        .map(|h| h.to_string())
        .collect();
    let rows = reader
        .records()
        .map(|r| {
            r.expect("record")
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
        })
        .collect();
    (headers, rows)
}

pub fn row(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

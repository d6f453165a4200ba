use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// More context: https://docs.blender.org/manual/en/latest/advanced/command_line/arguments.html#format-options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum Format {
    TGA,
    RAWTGA,
    JPEG,
    IRIS,
    AVIRAW,
    AVIJPEG,
    #[default]
    PNG,
    BMP,
    HDR,
    TIFF,
    OpenExr,
    OpenExrMultilayer,
}

impl Serialize for Format {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "TGA" | "TARGA" => Ok(Format::TGA),
            "RAWTGA" | "RAWTARGA" => Ok(Format::RAWTGA),
            "JPEG" => Ok(Format::JPEG),
            "IRIS" => Ok(Format::IRIS),
            "AVIRAW" => Ok(Format::AVIRAW),
            "AVIJPEG" => Ok(Format::AVIJPEG),
            "PNG" => Ok(Format::PNG),
            "BMP" => Ok(Format::BMP),
            "HDR" => Ok(Format::HDR),
            "TIFF" => Ok(Format::TIFF),
            "OPEN_EXR" => Ok(Format::OpenExr),
            "OPEN_EXR_MULTILAYER" => Ok(Format::OpenExrMultilayer),
            other => Err(format!("unknown image format: {other}")),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Format::TGA => "TGA",
            Format::RAWTGA => "RAWTGA",
            Format::JPEG => "JPEG",
            Format::IRIS => "IRIS",
            Format::AVIRAW => "AVIRAW",
            Format::AVIJPEG => "AVIJPEG",
            Format::PNG => "PNG",
            Format::BMP => "BMP",
            Format::HDR => "HDR",
            Format::TIFF => "TIFF",
            Format::OpenExr => "OPEN_EXR",
            Format::OpenExrMultilayer => "OPEN_EXR_MULTILAYER",
        };
        f.write_str(name)
    }
}

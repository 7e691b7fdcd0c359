use crate::backup::finish::Finish;
use crate::backup::result_error::result::Result;
use derive_more::From;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use io_enum::{Read, Write};
use std::io;

#[derive(Write, From)]
pub enum Compressor<W: io::Write> {
    None(W),
    Gzip(GzEncoder<W>),
}

#[derive(Read, From)]
pub enum Decompressor<R: io::Read> {
    None(R),
    Gzip(GzDecoder<R>),
}

/// Stream compression applied on top of a tar archive.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum CompressorConfig {
    #[default]
    None,
    Gzip,
}

pub trait CompressorBuilder<W: io::Write> {
    fn build_compressor(&self, writer: W) -> Result<Compressor<W>>;
}

impl<W: io::Write> Finish<W> for Compressor<W> {
    fn finish(self) -> io::Result<W> {
        match self {
            Compressor::None(w) => Ok(w),
            Compressor::Gzip(w) => w.finish(),
        }
    }
}

impl<W: io::Write> CompressorBuilder<W> for CompressorConfig {
    fn build_compressor(&self, writer: W) -> Result<Compressor<W>> {
        Ok(match self {
            CompressorConfig::None => Compressor::None(writer),
            CompressorConfig::Gzip => {
                tracing::debug!("Creating gzip compressor");
                GzEncoder::new(writer, Compression::default()).into()
            }
        })
    }
}

impl CompressorConfig {
    pub fn build_decompressor<R: io::Read>(&self, reader: R) -> Decompressor<R> {
        match self {
            CompressorConfig::None => Decompressor::None(reader),
            CompressorConfig::Gzip => GzDecoder::new(reader).into(),
        }
    }
}

//! Remux and transcode pipelines over libav

use std::collections::HashMap;
use std::ffi::CStr;
use std::os::raw::c_char;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use ffmpeg_next as ffmpeg;
use ffmpeg::codec::{self, context::Context as CodecContext};
use ffmpeg::format::{self, context::Input, context::Output};
use ffmpeg::util::frame;
use ffmpeg::{decoder, encoder, ffi, filter, media, Dictionary, Packet, Rational, Rescale};

use crate::adapters::exec_sandbox::invocation::{
    AudioSettings, EngineInvocation, StreamDirective, StreamType, VideoSettings,
};
use crate::ports::EngineError;

const DEFAULT_PIXEL_FORMAT: &str = "yuv420p";
const FALLBACK_SAMPLE_RATE: i32 = 48_000;

fn failed(context: &'static str) -> impl Fn(ffmpeg::Error) -> EngineError {
    move |e| EngineError::Failed(format!("{}: {}", context, e))
}

fn check_cancel(cancel: &AtomicBool) -> Result<(), EngineError> {
    if cancel.load(Ordering::SeqCst) {
        Err(EngineError::Cancelled)
    } else {
        Ok(())
    }
}

fn media_type(stream_type: StreamType) -> media::Type {
    match stream_type {
        StreamType::Video => media::Type::Video,
        StreamType::Audio => media::Type::Audio,
    }
}

#[derive(Debug, Clone, Copy)]
struct Selected {
    input: usize,
    stream: usize,
    stream_type: StreamType,
}

/// Resolve `-map` specifiers (or best streams) to concrete stream indices
fn select_streams(inputs: &[Input], invocation: &EngineInvocation) -> Result<Vec<Selected>, EngineError> {
    let enabled = |t: StreamType| match t {
        StreamType::Video => invocation.video.is_enabled(),
        StreamType::Audio => invocation.audio.is_enabled(),
    };

    let mut selected = Vec::new();
    if invocation.maps.is_empty() {
        let first = inputs
            .first()
            .ok_or_else(|| EngineError::InvalidArguments("no inputs".to_string()))?;
        for stream_type in [StreamType::Video, StreamType::Audio] {
            if !enabled(stream_type) {
                continue;
            }
            if let Some(stream) = first.streams().best(media_type(stream_type)) {
                selected.push(Selected {
                    input: 0,
                    stream: stream.index(),
                    stream_type,
                });
            }
        }
    } else {
        for map in &invocation.maps {
            if !enabled(map.stream_type) {
                continue;
            }
            let input = inputs.get(map.input).ok_or_else(|| {
                EngineError::InvalidArguments(format!("map refers to missing input {}", map.input))
            })?;
            let found = input
                .streams()
                .filter(|s| s.parameters().medium() == media_type(map.stream_type))
                .nth(map.index)
                .map(|s| s.index());
            match found {
                Some(stream) => selected.push(Selected {
                    input: map.input,
                    stream,
                    stream_type: map.stream_type,
                }),
                None if map.optional => {}
                None => {
                    return Err(EngineError::Failed(format!(
                        "input {} has no {:?} stream #{}",
                        map.input, map.stream_type, map.index
                    )))
                }
            }
        }
    }

    if selected.is_empty() {
        return Err(EngineError::Failed("no streams selected".to_string()));
    }
    Ok(selected)
}

fn open_input(path: &Path) -> Result<Input, EngineError> {
    format::input(&path).map_err(failed("open input"))
}

fn open_output(path: &Path, invocation: &EngineInvocation) -> Result<Output, EngineError> {
    match &invocation.format {
        Some(muxer) => format::output_as(&path, muxer),
        None => format::output(&path),
    }
    .map_err(failed("open output"))
}

fn write_header(octx: &mut Output, invocation: &EngineInvocation) -> Result<(), EngineError> {
    let mut options = Dictionary::new();
    if let Some(flags) = &invocation.movflags {
        options.set("movflags", flags);
    }
    octx.write_header_with(options).map_err(failed("write header"))?;
    Ok(())
}

fn output_time_bases(octx: &Output) -> Vec<Rational> {
    octx.streams().map(|s| s.time_base()).collect()
}

fn read_packet(ictx: &mut Input) -> Result<Option<Packet>, EngineError> {
    let mut packet = Packet::empty();
    match packet.read(ictx) {
        Ok(()) => Ok(Some(packet)),
        Err(ffmpeg::Error::Eof) => Ok(None),
        Err(e) => Err(failed("read packet")(e)),
    }
}

/// Packet decode time in microseconds, for merging inputs
fn packet_time(packet: &Packet, time_base: Option<Rational>) -> i64 {
    let ts = packet.dts().or(packet.pts()).unwrap_or(0);
    match time_base {
        Some(tb) => ts.rescale(tb, Rational::new(1, 1_000_000)),
        None => i64::MIN,
    }
}

#[derive(Debug, Clone, Copy)]
struct CopyRoute {
    ost_index: usize,
    ist_time_base: Rational,
}

fn add_copy_stream(ist: &format::stream::Stream, octx: &mut Output) -> Result<CopyRoute, EngineError> {
    let mut ost = octx
        .add_stream(encoder::find(codec::Id::None))
        .map_err(failed("add stream"))?;
    ost.set_parameters(ist.parameters());
    // Let the muxer choose a tag valid for the target container.
    unsafe {
        (*ost.parameters().as_mut_ptr()).codec_tag = 0;
    }
    Ok(CopyRoute {
        ost_index: ost.index(),
        ist_time_base: ist.time_base(),
    })
}

fn write_copied(
    mut packet: Packet,
    route: CopyRoute,
    out_time_bases: &[Rational],
    octx: &mut Output,
) -> Result<(), EngineError> {
    packet.rescale_ts(route.ist_time_base, out_time_bases[route.ost_index]);
    packet.set_position(-1);
    packet.set_stream(route.ost_index);
    packet.write_interleaved(octx).map_err(failed("write packet"))
}

/// Stream-copy every selected stream of every input into one container
pub fn remux(
    invocation: &EngineInvocation,
    inputs: &[PathBuf],
    output: &Path,
    cancel: &AtomicBool,
) -> Result<(), EngineError> {
    let mut ictxs = inputs
        .iter()
        .map(|path| open_input(path))
        .collect::<Result<Vec<_>, _>>()?;
    let selected = select_streams(&ictxs, invocation)?;
    let mut octx = open_output(output, invocation)?;

    let mut routes: HashMap<(usize, usize), CopyRoute> = HashMap::new();
    for sel in &selected {
        let ist = ictxs[sel.input]
            .stream(sel.stream)
            .ok_or_else(|| EngineError::Failed(format!("stream {} vanished", sel.stream)))?;
        routes.insert((sel.input, sel.stream), add_copy_stream(&ist, &mut octx)?);
    }

    write_header(&mut octx, invocation)?;
    let out_time_bases = output_time_bases(&octx);

    let mut pending = ictxs
        .iter_mut()
        .map(read_packet)
        .collect::<Result<Vec<_>, _>>()?;

    loop {
        check_cancel(cancel)?;
        let next = pending
            .iter()
            .enumerate()
            .filter_map(|(i, p)| {
                p.as_ref().map(|packet| {
                    let time_base = routes.get(&(i, packet.stream())).map(|r| r.ist_time_base);
                    (i, packet_time(packet, time_base))
                })
            })
            .min_by_key(|(_, time)| *time)
            .map(|(i, _)| i);
        let Some(index) = next else { break };
        let Some(packet) = pending[index].take() else { break };
        pending[index] = read_packet(&mut ictxs[index])?;

        if let Some(route) = routes.get(&(index, packet.stream())).copied() {
            write_copied(packet, route, &out_time_bases, &mut octx)?;
        }
    }

    octx.write_trailer().map_err(failed("write trailer"))
}

/// Width, height and time base negotiated at a graph's sink
fn sink_properties(graph: &mut filter::Graph) -> Result<(u32, u32, Rational), EngineError> {
    let sink = graph
        .get("out")
        .ok_or_else(|| EngineError::Failed("filter graph has no sink".to_string()))?;
    // The graph is configured, so the sink link properties are final.
    unsafe {
        let ptr = sink.as_ptr();
        let width = ffi::av_buffersink_get_w(ptr).max(0) as u32;
        let height = ffi::av_buffersink_get_h(ptr).max(0) as u32;
        let time_base = Rational::from(ffi::av_buffersink_get_time_base(ptr));
        Ok((width, height, time_base))
    }
}

fn copy_encoder_parameters(
    octx: &mut Output,
    ost_index: usize,
    encoder: &CodecContext,
) -> Result<(), EngineError> {
    let ret = unsafe {
        let stream = *(*octx.as_mut_ptr()).streams.add(ost_index);
        ffi::avcodec_parameters_from_context((*stream).codecpar, encoder.as_ptr())
    };
    if ret < 0 {
        return Err(EngineError::Failed(format!(
            "copy encoder parameters: {}",
            ffmpeg::Error::from(ret)
        )));
    }
    Ok(())
}

fn drain_encoder(
    encoder: &mut encoder::Encoder,
    ost_index: usize,
    encoder_time_base: Rational,
    ost_time_base: Rational,
    octx: &mut Output,
) -> Result<(), EngineError> {
    let mut encoded = Packet::empty();
    while encoder.receive_packet(&mut encoded).is_ok() {
        encoded.set_stream(ost_index);
        encoded.rescale_ts(encoder_time_base, ost_time_base);
        encoded
            .write_interleaved(octx)
            .map_err(failed("write packet"))?;
    }
    Ok(())
}

struct VideoTranscoder {
    ost_index: usize,
    decoder: decoder::Video,
    graph: filter::Graph,
    encoder: encoder::video::Encoder,
    encoder_time_base: Rational,
}

impl VideoTranscoder {
    fn new(
        ist: &format::stream::Stream,
        octx: &mut Output,
        settings: &VideoSettings,
        global_header: bool,
    ) -> Result<Self, EngineError> {
        let decoder = CodecContext::from_parameters(ist.parameters())
            .map_err(failed("video decoder"))?
            .decoder()
            .video()
            .map_err(failed("video decoder"))?;

        let pixel_name = settings.pixel_format.as_deref().unwrap_or(DEFAULT_PIXEL_FORMAT);
        let pixel_format: format::Pixel = pixel_name
            .parse()
            .map_err(|_| EngineError::InvalidArguments(format!("unknown pixel format `{}`", pixel_name)))?;

        let spec = match &settings.filter {
            Some(filter) => format!("{},format={}", filter, pixel_name),
            None => format!("format={}", pixel_name),
        };
        let mut graph = video_graph(&decoder, ist.time_base(), &spec)?;
        let (width, height, encoder_time_base) = sink_properties(&mut graph)?;

        let mut frame_rate = ist.avg_frame_rate();
        if frame_rate.numerator() <= 0 || frame_rate.denominator() <= 0 {
            frame_rate = ist.rate();
        }
        if frame_rate.numerator() <= 0 || frame_rate.denominator() <= 0 {
            frame_rate = Rational::new(25, 1);
        }

        let codec = encoder::find_by_name(&settings.encoder)
            .ok_or_else(|| EngineError::Failed(format!("encoder {} not available", settings.encoder)))?;
        let ost_index = {
            let mut ost = octx.add_stream(codec).map_err(failed("add video stream"))?;
            ost.set_time_base(encoder_time_base);
            ost.index()
        };

        let mut context = CodecContext::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(failed("video encoder"))?;
        context.set_width(width);
        context.set_height(height);
        context.set_format(pixel_format);
        context.set_time_base(encoder_time_base);
        context.set_frame_rate(Some(frame_rate));
        if let Some(bitrate) = settings.bitrate_bps {
            context.set_bit_rate(bitrate);
        }
        if global_header {
            context.set_flags(codec::flag::Flags::GLOBAL_HEADER);
        }

        let mut options = Dictionary::new();
        for (key, value) in &settings.options {
            options.set(key, value);
        }
        let encoder = context
            .open_as_with(codec, options)
            .map_err(failed("open video encoder"))?;
        copy_encoder_parameters(octx, ost_index, &encoder)?;

        Ok(Self {
            ost_index,
            decoder,
            graph,
            encoder,
            encoder_time_base,
        })
    }

    fn push(&mut self, packet: &Packet, octx: &mut Output, out_time_bases: &[Rational]) -> Result<(), EngineError> {
        self.decoder.send_packet(packet).map_err(failed("decode video"))?;
        self.drain_decoder(octx, out_time_bases)
    }

    fn drain_decoder(&mut self, octx: &mut Output, out_time_bases: &[Rational]) -> Result<(), EngineError> {
        let mut decoded = frame::Video::empty();
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            let timestamp = decoded.timestamp();
            decoded.set_pts(timestamp);
            self.graph
                .get("in")
                .ok_or_else(|| EngineError::Failed("filter graph has no source".to_string()))?
                .source()
                .add(&decoded)
                .map_err(failed("filter video"))?;
            self.drain_filter(octx, out_time_bases)?;
        }
        Ok(())
    }

    fn drain_filter(&mut self, octx: &mut Output, out_time_bases: &[Rational]) -> Result<(), EngineError> {
        let mut filtered = frame::Video::empty();
        loop {
            let Some(mut sink) = self.graph.get("out") else { break };
            if sink.sink().frame(&mut filtered).is_err() {
                break;
            }
            filtered.set_kind(ffmpeg::picture::Type::None);
            self.encoder.send_frame(&filtered).map_err(failed("encode video"))?;
            drain_encoder(
                &mut self.encoder,
                self.ost_index,
                self.encoder_time_base,
                out_time_bases[self.ost_index],
                octx,
            )?;
        }
        Ok(())
    }

    fn finish(&mut self, octx: &mut Output, out_time_bases: &[Rational]) -> Result<(), EngineError> {
        self.decoder.send_eof().map_err(failed("flush video decoder"))?;
        self.drain_decoder(octx, out_time_bases)?;
        if let Some(mut source) = self.graph.get("in") {
            source.source().flush().map_err(failed("flush video filter"))?;
        }
        self.drain_filter(octx, out_time_bases)?;
        self.encoder.send_eof().map_err(failed("flush video encoder"))?;
        drain_encoder(
            &mut self.encoder,
            self.ost_index,
            self.encoder_time_base,
            out_time_bases[self.ost_index],
            octx,
        )
    }
}

fn video_graph(decoder: &decoder::Video, time_base: Rational, spec: &str) -> Result<filter::Graph, EngineError> {
    let mut graph = filter::Graph::new();
    let aspect = decoder.aspect_ratio();
    let (sar_num, sar_den) = if aspect.numerator() > 0 && aspect.denominator() > 0 {
        (aspect.numerator(), aspect.denominator())
    } else {
        (1, 1)
    };
    let args = format!(
        "video_size={}x{}:pix_fmt={}:time_base={}/{}:pixel_aspect={}/{}",
        decoder.width(),
        decoder.height(),
        ffi::AVPixelFormat::from(decoder.format()) as i32,
        time_base.numerator(),
        time_base.denominator(),
        sar_num,
        sar_den
    );

    let buffer = filter::find("buffer")
        .ok_or_else(|| EngineError::Unavailable("buffer filter missing".to_string()))?;
    let buffersink = filter::find("buffersink")
        .ok_or_else(|| EngineError::Unavailable("buffersink filter missing".to_string()))?;
    graph.add(&buffer, "in", &args).map_err(failed("video filter source"))?;
    graph.add(&buffersink, "out", "").map_err(failed("video filter sink"))?;
    graph
        .output("in", 0)
        .and_then(|parser| parser.input("out", 0))
        .and_then(|parser| parser.parse(spec))
        .map_err(failed("parse video filter"))?;
    graph.validate().map_err(failed("configure video filter"))?;
    Ok(graph)
}

struct AudioTranscoder {
    ost_index: usize,
    decoder: decoder::Audio,
    graph: filter::Graph,
    encoder: encoder::audio::Encoder,
    sink_time_base: Rational,
    encoder_time_base: Rational,
}

impl AudioTranscoder {
    fn new(
        ist: &format::stream::Stream,
        octx: &mut Output,
        settings: &AudioSettings,
        global_header: bool,
    ) -> Result<Self, EngineError> {
        let decoder = CodecContext::from_parameters(ist.parameters())
            .map_err(failed("audio decoder"))?
            .decoder()
            .audio()
            .map_err(failed("audio decoder"))?;

        let codec = encoder::find_by_name(&settings.encoder)
            .ok_or_else(|| EngineError::Failed(format!("encoder {} not available", settings.encoder)))?;
        let audio_codec = codec.audio().map_err(failed("audio encoder"))?;

        let channels = settings.channels.unwrap_or(2).clamp(1, 2);
        let layout_name = if channels == 1 { "mono" } else { "stereo" };
        let sample_format = audio_codec
            .formats()
            .and_then(|mut formats| formats.next())
            .unwrap_or(format::Sample::F32(format::sample::Type::Planar));
        let rate = pick_sample_rate(audio_codec.rates().map(|r| r.collect()), decoder.rate() as i32);
        let encoder_time_base = Rational::new(1, rate);

        let spec = format!(
            "aformat=sample_fmts={}:sample_rates={}:channel_layouts={}",
            sample_format.name(),
            rate,
            layout_name
        );
        let mut graph = audio_graph(&decoder, ist.time_base(), &spec)?;
        let (_, _, sink_time_base) = sink_properties(&mut graph)?;

        let ost_index = {
            let mut ost = octx.add_stream(codec).map_err(failed("add audio stream"))?;
            ost.set_time_base(encoder_time_base);
            ost.index()
        };

        let mut context = CodecContext::new_with_codec(codec)
            .encoder()
            .audio()
            .map_err(failed("audio encoder"))?;
        context.set_rate(rate);
        context.set_format(sample_format);
        context.set_time_base(encoder_time_base);
        if let Some(bitrate) = settings.bitrate_bps {
            context.set_bit_rate(bitrate);
        }
        unsafe {
            ffi::av_channel_layout_default(&mut (*context.as_mut_ptr()).ch_layout, channels as i32);
        }
        if global_header {
            context.set_flags(codec::flag::Flags::GLOBAL_HEADER);
        }
        let encoder = context
            .open_as_with(codec, Dictionary::new())
            .map_err(failed("open audio encoder"))?;
        copy_encoder_parameters(octx, ost_index, &encoder)?;

        let variable_frames = codec
            .capabilities()
            .contains(codec::capabilities::Capabilities::VARIABLE_FRAME_SIZE);
        if !variable_frames {
            if let Some(mut sink) = graph.get("out") {
                sink.sink().set_frame_size(encoder.frame_size());
            }
        }

        Ok(Self {
            ost_index,
            decoder,
            graph,
            encoder,
            sink_time_base,
            encoder_time_base,
        })
    }

    fn push(&mut self, packet: &Packet, octx: &mut Output, out_time_bases: &[Rational]) -> Result<(), EngineError> {
        self.decoder.send_packet(packet).map_err(failed("decode audio"))?;
        self.drain_decoder(octx, out_time_bases)
    }

    fn drain_decoder(&mut self, octx: &mut Output, out_time_bases: &[Rational]) -> Result<(), EngineError> {
        let mut decoded = frame::Audio::empty();
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            let timestamp = decoded.timestamp();
            decoded.set_pts(timestamp);
            self.graph
                .get("in")
                .ok_or_else(|| EngineError::Failed("filter graph has no source".to_string()))?
                .source()
                .add(&decoded)
                .map_err(failed("filter audio"))?;
            self.drain_filter(octx, out_time_bases)?;
        }
        Ok(())
    }

    fn drain_filter(&mut self, octx: &mut Output, out_time_bases: &[Rational]) -> Result<(), EngineError> {
        let mut filtered = frame::Audio::empty();
        loop {
            let Some(mut sink) = self.graph.get("out") else { break };
            if sink.sink().frame(&mut filtered).is_err() {
                break;
            }
            let pts = filtered
                .pts()
                .map(|pts| pts.rescale(self.sink_time_base, self.encoder_time_base));
            filtered.set_pts(pts);
            self.encoder.send_frame(&filtered).map_err(failed("encode audio"))?;
            drain_encoder(
                &mut self.encoder,
                self.ost_index,
                self.encoder_time_base,
                out_time_bases[self.ost_index],
                octx,
            )?;
        }
        Ok(())
    }

    fn finish(&mut self, octx: &mut Output, out_time_bases: &[Rational]) -> Result<(), EngineError> {
        self.decoder.send_eof().map_err(failed("flush audio decoder"))?;
        self.drain_decoder(octx, out_time_bases)?;
        if let Some(mut source) = self.graph.get("in") {
            source.source().flush().map_err(failed("flush audio filter"))?;
        }
        self.drain_filter(octx, out_time_bases)?;
        self.encoder.send_eof().map_err(failed("flush audio encoder"))?;
        drain_encoder(
            &mut self.encoder,
            self.ost_index,
            self.encoder_time_base,
            out_time_bases[self.ost_index],
            octx,
        )
    }
}

fn pick_sample_rate(supported: Option<Vec<i32>>, source: i32) -> i32 {
    let source = if source > 0 { source } else { FALLBACK_SAMPLE_RATE };
    match supported {
        None => source,
        Some(rates) if rates.is_empty() || rates.contains(&source) => source,
        Some(rates) if rates.contains(&FALLBACK_SAMPLE_RATE) => FALLBACK_SAMPLE_RATE,
        Some(rates) => rates[0],
    }
}

fn channel_layout_description(decoder: &decoder::Audio) -> String {
    let mut buffer = [0 as c_char; 128];
    let written = unsafe {
        ffi::av_channel_layout_describe(
            &(*decoder.as_ptr()).ch_layout,
            buffer.as_mut_ptr(),
            buffer.len(),
        )
    };
    if written <= 0 {
        return "stereo".to_string();
    }
    unsafe { CStr::from_ptr(buffer.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

fn audio_graph(decoder: &decoder::Audio, time_base: Rational, spec: &str) -> Result<filter::Graph, EngineError> {
    let mut graph = filter::Graph::new();
    let args = format!(
        "time_base={}/{}:sample_rate={}:sample_fmt={}:channel_layout={}",
        time_base.numerator(),
        time_base.denominator(),
        decoder.rate(),
        decoder.format().name(),
        channel_layout_description(decoder)
    );

    let abuffer = filter::find("abuffer")
        .ok_or_else(|| EngineError::Unavailable("abuffer filter missing".to_string()))?;
    let abuffersink = filter::find("abuffersink")
        .ok_or_else(|| EngineError::Unavailable("abuffersink filter missing".to_string()))?;
    graph.add(&abuffer, "in", &args).map_err(failed("audio filter source"))?;
    graph.add(&abuffersink, "out", "").map_err(failed("audio filter sink"))?;
    graph
        .output("in", 0)
        .and_then(|parser| parser.input("out", 0))
        .and_then(|parser| parser.parse(spec))
        .map_err(failed("parse audio filter"))?;
    graph.validate().map_err(failed("configure audio filter"))?;
    Ok(graph)
}

enum StreamPipeline {
    Copy(CopyRoute),
    Video(Box<VideoTranscoder>),
    Audio(Box<AudioTranscoder>),
}

/// Decode, filter and encode the selected streams of a single input
pub fn transcode(
    invocation: &EngineInvocation,
    inputs: &[PathBuf],
    output: &Path,
    cancel: &AtomicBool,
) -> Result<(), EngineError> {
    let [input] = inputs else {
        return Err(EngineError::InvalidArguments(
            "transcoding reads exactly one input".to_string(),
        ));
    };
    let mut ictx = open_input(input)?;
    let selected = select_streams(std::slice::from_ref(&ictx), invocation)?;
    let mut octx = open_output(output, invocation)?;
    let global_header = octx
        .format()
        .flags()
        .contains(format::flag::Flags::GLOBAL_HEADER);

    let mut pipelines: HashMap<usize, StreamPipeline> = HashMap::new();
    for sel in &selected {
        let ist = ictx
            .stream(sel.stream)
            .ok_or_else(|| EngineError::Failed(format!("stream {} vanished", sel.stream)))?;
        let pipeline = match (sel.stream_type, &invocation.video, &invocation.audio) {
            (StreamType::Video, StreamDirective::Encode(settings), _) => StreamPipeline::Video(
                Box::new(VideoTranscoder::new(&ist, &mut octx, settings, global_header)?),
            ),
            (StreamType::Audio, _, StreamDirective::Encode(settings)) => StreamPipeline::Audio(
                Box::new(AudioTranscoder::new(&ist, &mut octx, settings, global_header)?),
            ),
            _ => StreamPipeline::Copy(add_copy_stream(&ist, &mut octx)?),
        };
        pipelines.insert(sel.stream, pipeline);
    }

    write_header(&mut octx, invocation)?;
    let out_time_bases = output_time_bases(&octx);

    for (stream, packet) in ictx.packets() {
        check_cancel(cancel)?;
        match pipelines.get_mut(&stream.index()) {
            Some(StreamPipeline::Copy(route)) => {
                write_copied(packet, *route, &out_time_bases, &mut octx)?
            }
            Some(StreamPipeline::Video(video)) => video.push(&packet, &mut octx, &out_time_bases)?,
            Some(StreamPipeline::Audio(audio)) => audio.push(&packet, &mut octx, &out_time_bases)?,
            None => {}
        }
    }

    for pipeline in pipelines.values_mut() {
        check_cancel(cancel)?;
        match pipeline {
            StreamPipeline::Copy(_) => {}
            StreamPipeline::Video(video) => video.finish(&mut octx, &out_time_bases)?,
            StreamPipeline::Audio(audio) => audio.finish(&mut octx, &out_time_bases)?,
        }
    }

    octx.write_trailer().map_err(failed("write trailer"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_rate_selection() {
        assert_eq!(pick_sample_rate(None, 44_100), 44_100);
        assert_eq!(pick_sample_rate(Some(vec![48_000, 24_000]), 44_100), 48_000);
        assert_eq!(pick_sample_rate(Some(vec![44_100, 48_000]), 44_100), 44_100);
        assert_eq!(pick_sample_rate(Some(vec![16_000]), 44_100), 16_000);
        assert_eq!(pick_sample_rate(None, 0), FALLBACK_SAMPLE_RATE);
    }

    #[test]
    fn test_packet_time_without_route_sorts_first() {
        let packet = Packet::empty();
        assert_eq!(packet_time(&packet, None), i64::MIN);
        assert_eq!(packet_time(&packet, Some(Rational::new(1, 90_000))), 0);
    }
}

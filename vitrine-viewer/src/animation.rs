//! Keyframe animation: clips sampled from glTF channels, a clip mixer for
//! continuous playback and frame-ranged animation groups for scrubbing.

use crate::three_d::Scene3D;
use glam::{Quat, Vec3, Vec4};

/// Frame rate used to convert group frame numbers into clip time
pub const FRAMES_PER_SECOND: f32 = 60.0;

/// How values between two keyframes are computed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    /// Linear (spherical for rotations)
    Linear,
    /// Hold the previous keyframe
    Step,
    /// Hermite spline with per-keyframe tangents
    CubicSpline,
}

/// Keyframe values of one channel
///
/// For [`Interpolation::CubicSpline`] each keyframe stores three entries:
/// in-tangent, value, out-tangent.
#[derive(Debug, Clone, PartialEq)]
pub enum Keyframes {
    /// Node translations
    Translation(Vec<Vec3>),
    /// Node rotations
    Rotation(Vec<Quat>),
    /// Node scales
    Scale(Vec<Vec3>),
    /// Morph target weights, flattened keyframe-major
    Weights(Vec<f32>),
}

/// One animated property of one node
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    /// Target node index
    pub node: usize,
    /// Keyframe times in seconds, ascending
    pub times: Vec<f32>,
    /// Keyframe values
    pub keyframes: Keyframes,
    /// Interpolation mode
    pub interpolation: Interpolation,
}

enum Segment {
    At(usize),
    Between { index: usize, u: f32, dt: f32 },
}

fn locate(times: &[f32], time: f32) -> Option<Segment> {
    let last = times.len().checked_sub(1)?;
    if time <= times[0] {
        return Some(Segment::At(0));
    }
    if time >= times[last] {
        return Some(Segment::At(last));
    }
    let index = times.partition_point(|&t| t <= time).saturating_sub(1).min(last - 1);
    let dt = times[index + 1] - times[index];
    if dt <= f32::EPSILON {
        return Some(Segment::At(index + 1));
    }
    Some(Segment::Between {
        index,
        u: (time - times[index]) / dt,
        dt,
    })
}

fn hermite(p0: Vec4, m0: Vec4, p1: Vec4, m1: Vec4, t: f32) -> Vec4 {
    let t2 = t * t;
    let t3 = t2 * t;
    p0 * (2.0 * t3 - 3.0 * t2 + 1.0)
        + m0 * (t3 - 2.0 * t2 + t)
        + p1 * (-2.0 * t3 + 3.0 * t2)
        + m1 * (t3 - t2)
}

/// Sample `stride` floats per keyframe
fn sample_floats(
    values: &[f32],
    stride: usize,
    times: &[f32],
    mode: Interpolation,
    time: f32,
) -> Vec<f32> {
    let read = |key: usize, part: usize| {
        let entry = match mode {
            Interpolation::CubicSpline => key * 3 + part,
            _ => key,
        };
        values.get(entry * stride..(entry + 1) * stride).unwrap_or(&[])
    };

    match locate(times, time) {
        None => Vec::new(),
        Some(Segment::At(key)) => read(key, 1).to_vec(),
        Some(Segment::Between { index, u, dt }) => match mode {
            Interpolation::Step => read(index, 1).to_vec(),
            Interpolation::Linear => read(index, 1)
                .iter()
                .zip(read(index + 1, 1))
                .map(|(a, b)| a + (b - a) * u)
                .collect(),
            Interpolation::CubicSpline => {
                let (p0, m0) = (read(index, 1), read(index, 2));
                let (p1, m1) = (read(index + 1, 1), read(index + 1, 0));
                (0..stride.min(p0.len()).min(p1.len()).min(m0.len()).min(m1.len()))
                    .map(|i| {
                        hermite(
                            Vec4::splat(p0[i]),
                            Vec4::splat(m0[i] * dt),
                            Vec4::splat(p1[i]),
                            Vec4::splat(m1[i] * dt),
                            u,
                        )
                        .x
                    })
                    .collect()
            }
        },
    }
}

impl Channel {
    /// Number of keyframes
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// Whether the channel has no keyframes
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Write the channel's value at `time` into its target node
    pub fn apply(&self, scene: &mut Scene3D, time: f32) {
        let Some(node) = scene.nodes.get_mut(self.node) else {
            return;
        };
        let mode = self.interpolation;
        match &self.keyframes {
            Keyframes::Translation(values) => {
                if let Some(v) = sample_vec3(values, &self.times, mode, time) {
                    node.translation = v;
                }
            }
            Keyframes::Scale(values) => {
                if let Some(v) = sample_vec3(values, &self.times, mode, time) {
                    node.scale = v;
                }
            }
            Keyframes::Rotation(values) => {
                if let Some(q) = sample_quat(values, &self.times, mode, time) {
                    node.rotation = q;
                }
            }
            Keyframes::Weights(values) => {
                let per_key = match mode {
                    Interpolation::CubicSpline => self.times.len() * 3,
                    _ => self.times.len(),
                };
                if per_key == 0 {
                    return;
                }
                let stride = values.len() / per_key;
                node.weights = sample_floats(values, stride, &self.times, mode, time);
            }
        }
    }
}

fn sample_vec3(values: &[Vec3], times: &[f32], mode: Interpolation, time: f32) -> Option<Vec3> {
    let flat: Vec<f32> = values.iter().flat_map(|v| v.to_array()).collect();
    let sampled = sample_floats(&flat, 3, times, mode, time);
    (sampled.len() == 3).then(|| Vec3::new(sampled[0], sampled[1], sampled[2]))
}

fn sample_quat(values: &[Quat], times: &[f32], mode: Interpolation, time: f32) -> Option<Quat> {
    let value = |key: usize, part: usize| -> Option<Quat> {
        let entry = match mode {
            Interpolation::CubicSpline => key * 3 + part,
            _ => key,
        };
        values.get(entry).copied()
    };

    match locate(times, time)? {
        Segment::At(key) => value(key, 1),
        Segment::Between { index, u, dt } => match mode {
            Interpolation::Step => value(index, 1),
            Interpolation::Linear => Some(value(index, 1)?.slerp(value(index + 1, 1)?, u)),
            Interpolation::CubicSpline => {
                let p0 = Vec4::from(value(index, 1)?);
                let m0 = Vec4::from(value(index, 2)?) * dt;
                let p1 = Vec4::from(value(index + 1, 1)?);
                let m1 = Vec4::from(value(index + 1, 0)?) * dt;
                Some(Quat::from_vec4(hermite(p0, m0, p1, m1, u)).normalize())
            }
        },
    }
}

/// A named set of channels played together
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationClip {
    /// Clip name
    pub name: String,
    /// Animated channels
    pub channels: Vec<Channel>,
    /// Length in seconds (time of the last keyframe)
    pub duration: f32,
}

impl AnimationClip {
    /// Create a clip, deriving its duration from the channels
    pub fn new(name: String, channels: Vec<Channel>) -> Self {
        let duration = channels
            .iter()
            .filter_map(|c| c.times.last().copied())
            .fold(0.0, f32::max);
        Self {
            name,
            channels,
            duration,
        }
    }

    /// Pose `scene` at `time` seconds
    pub fn apply(&self, scene: &mut Scene3D, time: f32) {
        for channel in &self.channels {
            channel.apply(scene, time);
        }
    }

    /// Length of the clip in frames at [`FRAMES_PER_SECOND`]
    pub fn frame_count(&self) -> f32 {
        self.duration * FRAMES_PER_SECOND
    }
}

/// Playback state of one clip inside a mixer
#[derive(Debug, Clone, PartialEq)]
pub struct ClipAction {
    /// Index of the clip in the owner's clip list
    pub clip: usize,
    /// Local time in seconds
    pub time: f32,
    /// Whether the action advances
    pub playing: bool,
    /// Wrap around at the end instead of holding the last pose
    pub looping: bool,
}

impl ClipAction {
    fn new(clip: usize) -> Self {
        Self {
            clip,
            time: 0.0,
            playing: false,
            looping: true,
        }
    }

    /// Rewind to the start
    pub fn reset(&mut self) -> &mut Self {
        self.time = 0.0;
        self
    }

    /// Start advancing
    pub fn play(&mut self) -> &mut Self {
        self.playing = true;
        self
    }

    /// Stop advancing and rewind
    pub fn stop(&mut self) -> &mut Self {
        self.playing = false;
        self.time = 0.0;
        self
    }
}

/// Plays any number of clips continuously against one scene
#[derive(Debug, Clone)]
pub struct AnimationMixer {
    actions: Vec<ClipAction>,
    /// Multiplier applied to every `update` delta
    pub time_scale: f32,
}

impl Default for AnimationMixer {
    fn default() -> Self {
        Self::new()
    }
}

impl AnimationMixer {
    /// Create an empty mixer
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
            time_scale: 1.0,
        }
    }

    /// Action for `clip`, created on first use
    pub fn clip_action(&mut self, clip: usize) -> &mut ClipAction {
        let position = match self.actions.iter().position(|a| a.clip == clip) {
            Some(position) => position,
            None => {
                self.actions.push(ClipAction::new(clip));
                self.actions.len() - 1
            }
        };
        &mut self.actions[position]
    }

    /// Whether the action for `clip` exists and is playing
    pub fn is_playing(&self, clip: usize) -> bool {
        self.actions.iter().any(|a| a.clip == clip && a.playing)
    }

    /// Stop and rewind every action
    pub fn stop_all_action(&mut self) {
        for action in &mut self.actions {
            action.stop();
        }
    }

    /// Advance every playing action by `dt` seconds and pose the scene
    pub fn update(&mut self, dt: f32, clips: &[AnimationClip], scene: &mut Scene3D) {
        let dt = dt * self.time_scale;
        for action in self.actions.iter_mut().filter(|a| a.playing) {
            let Some(clip) = clips.get(action.clip) else {
                continue;
            };
            action.time += dt;
            if clip.duration > 0.0 {
                if action.looping {
                    action.time = action.time.rem_euclid(clip.duration);
                } else if action.time >= clip.duration {
                    action.time = clip.duration;
                    action.playing = false;
                }
            }
            clip.apply(scene, action.time);
        }
    }
}

/// A clip played over an explicit frame range at a signed speed ratio
///
/// The playhead always travels from `from` toward `to`; the speed ratio's
/// magnitude sets how fast, so `start(false, -0.7, 6.0, 5.0)` plays backwards
/// at 0.7x while `start(false, 1000.0, 5.0, 6.0)` jumps forward almost at once.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationGroup {
    /// Group name (the clip name)
    pub name: String,
    /// Index of the clip in the owner's clip list
    pub clip: usize,
    from: f32,
    to: f32,
    frame: f32,
    speed: f32,
    looping: bool,
    playing: bool,
    last_frame: f32,
}

impl AnimationGroup {
    /// Group playing `clip`, which spans `last_frame` frames
    pub fn new(name: String, clip: usize, last_frame: f32) -> Self {
        Self {
            name,
            clip,
            from: 0.0,
            to: last_frame,
            frame: 0.0,
            speed: 1.0,
            looping: false,
            playing: false,
            last_frame,
        }
    }

    /// Group for `clips[clip]`
    pub fn for_clip(clips: &[AnimationClip], clip: usize) -> Option<Self> {
        clips
            .get(clip)
            .map(|c| Self::new(c.name.clone(), clip, c.frame_count()))
    }

    /// Play from frame `from` to frame `to` at `speed` times real time
    pub fn start(&mut self, looping: bool, speed: f32, from: f32, to: f32) {
        self.looping = looping;
        self.speed = speed;
        self.from = from;
        self.to = to;
        self.frame = from;
        self.playing = true;
    }

    /// Play the whole clip once at normal speed
    pub fn start_full(&mut self) {
        self.start(false, 1.0, 0.0, self.last_frame);
    }

    /// Halt playback where it is
    pub fn stop(&mut self) {
        self.playing = false;
    }

    /// Whether the playhead is moving
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Current playhead frame
    pub fn frame(&self) -> f32 {
        self.frame
    }

    /// Signed speed ratio of the last `start`
    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Target frame of the last `start`
    pub fn target_frame(&self) -> f32 {
        self.to
    }

    /// Last frame of the clip
    pub fn last_frame(&self) -> f32 {
        self.last_frame
    }

    /// Advance by `dt` seconds and pose the scene
    pub fn advance(&mut self, dt: f32, clips: &[AnimationClip], scene: &mut Scene3D) {
        if !self.playing {
            return;
        }
        let Some(clip) = clips.get(self.clip) else {
            self.playing = false;
            return;
        };

        let span = self.to - self.from;
        let step = self.speed.abs() * FRAMES_PER_SECOND * dt;
        if span == 0.0 {
            self.frame = self.to;
            self.playing = false;
        } else {
            self.frame += span.signum() * step;
            let travelled = (self.frame - self.from) / span;
            if travelled >= 1.0 {
                if self.looping {
                    self.frame = self.from + span * travelled.fract();
                } else {
                    self.frame = self.to;
                    self.playing = false;
                }
            }
        }

        clip.apply(scene, self.frame / FRAMES_PER_SECOND);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::three_d::{Node3D, Scene3D};

    fn slide_clip() -> AnimationClip {
        AnimationClip::new(
            "slide".to_string(),
            vec![Channel {
                node: 0,
                times: vec![0.0, 1.0],
                keyframes: Keyframes::Translation(vec![Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0)]),
                interpolation: Interpolation::Linear,
            }],
        )
    }

    fn one_node_scene() -> Scene3D {
        let mut scene = Scene3D::new("anim".to_string());
        scene.add_node(Node3D::new("target".to_string()));
        scene
    }

    #[test]
    fn test_linear_sampling() {
        let clip = slide_clip();
        let mut scene = one_node_scene();
        clip.apply(&mut scene, 0.25);
        assert!((scene.nodes[0].translation.x - 2.5).abs() < 1e-5);
        clip.apply(&mut scene, 5.0);
        assert_eq!(scene.nodes[0].translation.x, 10.0);
    }

    #[test]
    fn test_step_sampling_holds_previous_key() {
        let mut clip = slide_clip();
        clip.channels[0].interpolation = Interpolation::Step;
        let mut scene = one_node_scene();
        clip.apply(&mut scene, 0.9);
        assert_eq!(scene.nodes[0].translation.x, 0.0);
    }

    #[test]
    fn test_cubic_spline_hits_keyframes() {
        let clip = AnimationClip::new(
            "spline".to_string(),
            vec![Channel {
                node: 0,
                times: vec![0.0, 1.0],
                keyframes: Keyframes::Translation(vec![
                    Vec3::ZERO,
                    Vec3::ZERO,
                    Vec3::ZERO,
                    Vec3::ZERO,
                    Vec3::new(4.0, 0.0, 0.0),
                    Vec3::ZERO,
                ]),
                interpolation: Interpolation::CubicSpline,
            }],
        );
        let mut scene = one_node_scene();
        clip.apply(&mut scene, 1.0);
        assert_eq!(scene.nodes[0].translation.x, 4.0);
        clip.apply(&mut scene, 0.5);
        assert!((scene.nodes[0].translation.x - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_mixer_loops_playing_actions() {
        let clips = vec![slide_clip()];
        let mut scene = one_node_scene();
        let mut mixer = AnimationMixer::new();
        mixer.clip_action(0).reset().play();
        mixer.update(1.5, &clips, &mut scene);
        assert!((scene.nodes[0].translation.x - 5.0).abs() < 1e-4);
        assert!(mixer.is_playing(0));

        mixer.stop_all_action();
        assert!(!mixer.is_playing(0));
    }

    #[test]
    fn test_mixer_time_scale() {
        let clips = vec![slide_clip()];
        let mut scene = one_node_scene();
        let mut mixer = AnimationMixer::new();
        mixer.time_scale = 0.5;
        mixer.clip_action(0).play();
        mixer.update(0.5, &clips, &mut scene);
        assert!((scene.nodes[0].translation.x - 2.5).abs() < 1e-4);
    }

    #[test]
    fn test_group_plays_range_and_stops() {
        let clips = vec![slide_clip()];
        let mut scene = one_node_scene();
        let mut group = AnimationGroup::for_clip(&clips, 0).unwrap();
        assert_eq!(group.last_frame(), 60.0);

        group.start(false, 1000.0, 5.0, 6.23);
        group.advance(1.0 / 60.0, &clips, &mut scene);
        assert!(!group.is_playing());
        assert_eq!(group.frame(), 6.23);
    }

    #[test]
    fn test_group_plays_backwards_toward_target() {
        let clips = vec![slide_clip()];
        let mut scene = one_node_scene();
        let mut group = AnimationGroup::for_clip(&clips, 0).unwrap();

        group.start(false, -0.7, 6.0, 5.0);
        group.advance(1.0 / 60.0, &clips, &mut scene);
        assert!(group.is_playing());
        assert!((group.frame() - 5.3).abs() < 1e-4);

        group.advance(1.0, &clips, &mut scene);
        assert!(!group.is_playing());
        assert_eq!(group.frame(), 5.0);
    }
}

// MIDI ports - enumeration and selection of midir inputs and outputs

use midir::{MidiInput as MidirInput, MidiInputPort, MidiOutput as MidirOutput, MidiOutputPort};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MidiPortInfo {
    pub index: usize,
    pub name: String,
}

/// How the user picked a port on the command line
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PortSelector {
    Index(usize),
    /// Case-insensitive substring of the port name
    Name(String),
}

impl PortSelector {
    pub fn parse(value: &str) -> Self {
        match value.parse::<usize>() {
            Ok(index) => PortSelector::Index(index),
            Err(_) => PortSelector::Name(value.to_string()),
        }
    }

    fn matches(&self, index: usize, name: &str) -> bool {
        match self {
            PortSelector::Index(wanted) => *wanted == index,
            PortSelector::Name(wanted) => name.to_lowercase().contains(&wanted.to_lowercase()),
        }
    }
}

fn select(mut names: impl Iterator<Item = (usize, String)>, selector: &PortSelector) -> Option<usize> {
    names
        .find(|(index, name)| selector.matches(*index, name))
        .map(|(index, _)| index)
}

pub fn list_input_ports() -> Vec<MidiPortInfo> {
    let Ok(midi_in) = MidirInput::new("unimidi-seq scanner") else {
        return Vec::new();
    };
    midi_in
        .ports()
        .iter()
        .enumerate()
        .filter_map(|(index, port)| {
            midi_in
                .port_name(port)
                .ok()
                .map(|name| MidiPortInfo { index, name })
        })
        .collect()
}

pub fn list_output_ports() -> Vec<MidiPortInfo> {
    let Ok(midi_out) = MidirOutput::new("unimidi-seq scanner") else {
        return Vec::new();
    };
    midi_out
        .ports()
        .iter()
        .enumerate()
        .filter_map(|(index, port)| {
            midi_out
                .port_name(port)
                .ok()
                .map(|name| MidiPortInfo { index, name })
        })
        .collect()
}

/// Find an input port, or the first one when `selector` is `None`
pub fn find_input_port(selector: Option<&PortSelector>) -> Option<(MidirInput, MidiInputPort)> {
    let midi_in = MidirInput::new("unimidi-seq input").ok()?;
    let ports = midi_in.ports();
    let index = match selector {
        Some(selector) => select(
            ports
                .iter()
                .enumerate()
                .map(|(i, p)| (i, midi_in.port_name(p).unwrap_or_default())),
            selector,
        )?,
        None => 0,
    };
    let port = ports.get(index)?.clone();
    Some((midi_in, port))
}

/// Find an output port, or the first one when `selector` is `None`
pub fn find_output_port(selector: Option<&PortSelector>) -> Option<(MidirOutput, MidiOutputPort)> {
    let midi_out = MidirOutput::new("unimidi-seq output").ok()?;
    let ports = midi_out.ports();
    let index = match selector {
        Some(selector) => select(
            ports
                .iter()
                .enumerate()
                .map(|(i, p)| (i, midi_out.port_name(p).unwrap_or_default())),
            selector,
        )?,
        None => 0,
    };
    let port = ports.get(index)?.clone();
    Some((midi_out, port))
}

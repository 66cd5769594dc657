#![allow(dead_code)]

use std::{cell::RefCell, rc::Rc};

use tv_scene::loading::LoadingScreen;

/// Pack a JSON document and a binary chunk into a `.glb`.
pub fn glb(json: &str, bin: &[u8]) -> Vec<u8> {
    let mut json = json.as_bytes().to_vec();
    while json.len() % 4 != 0 {
        json.push(b' ');
    }
    let mut bin = bin.to_vec();
    while bin.len() % 4 != 0 {
        bin.push(0);
    }
    let total = 12 + 8 + json.len() + 8 + bin.len();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(b"glTF");
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&(json.len() as u32).to_le_bytes());
    out.extend_from_slice(b"JSON");
    out.extend_from_slice(&json);
    out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
    out.extend_from_slice(b"BIN\0");
    out.extend_from_slice(&bin);
    out
}

/// A unit quad in the xy plane, reused by every mesh of [`tv_glb`].
fn quad() -> Vec<u8> {
    let positions: [[f32; 3]; 4] = [
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [1.0, 1.0, 0.0],
        [0.0, 1.0, 0.0],
    ];
    let indices: [u16; 6] = [0, 1, 2, 0, 2, 3];
    let mut bin: Vec<u8> = positions
        .iter()
        .flatten()
        .flat_map(|f| f.to_le_bytes())
        .collect();
    bin.extend(indices.iter().flat_map(|i| i.to_le_bytes()));
    bin
}

/// Cabinet with the screen on top, a shelf with a book lying next to it and a plant on the book.
pub fn tv_glb() -> Vec<u8> {
    let json = r#"{
        "asset": { "version": "2.0" },
        "buffers": [{ "byteLength": 60 }],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 48 },
            { "buffer": 0, "byteOffset": 48, "byteLength": 12 }
        ],
        "accessors": [
            {
                "bufferView": 0, "componentType": 5126, "count": 4, "type": "VEC3",
                "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]
            },
            { "bufferView": 1, "componentType": 5123, "count": 6, "type": "SCALAR" }
        ],
        "materials": [
            { "name": "wood", "pbrMetallicRoughness": { "baseColorFactor": [0.4, 0.2, 0.1, 1.0] } },
            { "name": "glass", "pbrMetallicRoughness": { "baseColorFactor": [0.0, 0.0, 0.0, 1.0] } }
        ],
        "meshes": [
            { "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1, "material": 0 }] },
            { "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1, "material": 1 }] }
        ],
        "nodes": [
            { "name": "Cabinet", "mesh": 0, "children": [1] },
            { "name": "Screen", "mesh": 1, "translation": [0.0, 1.0, 0.5] },
            { "name": "Shelf", "translation": [3.0, 0.0, 0.0], "children": [3] },
            { "name": "Book", "mesh": 0, "children": [4] },
            { "name": "Plant", "mesh": 0, "translation": [0.0, 1.0, 0.0] }
        ],
        "scenes": [{ "nodes": [0, 2] }],
        "scene": 0
    }"#;
    glb(json, &quad())
}

/// Records every call it receives.
#[derive(Clone, Default)]
pub struct Recorder(pub Rc<RefCell<Vec<&'static str>>>);

impl LoadingScreen for Recorder {
    fn display(&mut self) {
        self.0.borrow_mut().push("display");
    }

    fn hide(&mut self) {
        self.0.borrow_mut().push("hide");
    }
}
